//! Error handling and lifetime rules of a single instance.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pdhost_core::pd::{Message, MidiEvent, PdError, PdInstance};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_multi.pd")
}

fn instance() -> PdInstance {
    PdInstance::new(2, 2, 44100).unwrap()
}

#[test]
fn patch_dispose_twice_fails() {
    let pd = instance();
    let patch = pd.open_patch(fixture()).unwrap();
    assert_eq!(pd.open_patches().unwrap(), 1);

    patch.dispose().unwrap();
    assert_eq!(pd.open_patches().unwrap(), 0);
    assert!(patch.dispose().unwrap_err().is_use_after_dispose());

    // Instance teardown must skip the closed patch
    pd.dispose().unwrap();
}

#[test]
fn any_disposal_order_is_safe() {
    let pd = instance();
    let first = pd.open_patch(fixture()).unwrap();
    let second = pd.open_patch(fixture()).unwrap();
    assert_ne!(first.dollar_zero(), second.dollar_zero());

    second.dispose().unwrap();
    pd.dispose().unwrap();
    assert!(first.dispose().unwrap_err().is_use_after_dispose());
    assert!(pd.dispose().unwrap_err().is_use_after_dispose());
}

#[test]
fn every_operation_fails_after_dispose() {
    let pd = instance();
    let _patch = pd.open_patch(fixture()).unwrap();
    let array = pd.array("array1").unwrap();
    pd.dispose().unwrap();

    let mut out = vec![0.0; 128];
    let errors = vec![
        pd.open_patch(fixture()).unwrap_err(),
        pd.messaging().bind("spam").unwrap_err(),
        pd.messaging().send("spam", 1.0).unwrap_err(),
        pd.midi().send_note_on(0, 60, 100).unwrap_err(),
        pd.start().unwrap_err(),
        pd.process(1, &[0.0; 128], &mut out).unwrap_err(),
        array.read(0, 1).unwrap_err(),
        array.write(0, &[1.0]).unwrap_err(),
        array.size().unwrap_err(),
    ];
    for err in errors {
        assert!(err.is_use_after_dispose(), "unexpected error: {}", err);
    }
}

#[test]
fn listener_registration_fails_after_dispose() {
    let pd = instance();
    let id = pd.messaging().add_listener(|_| {}).unwrap();
    pd.dispose().unwrap();

    let errors = vec![
        pd.messaging().add_listener(|_| {}).unwrap_err(),
        pd.messaging().on_receiver("spam", |_| {}).unwrap_err(),
        pd.messaging().remove_listener(id).unwrap_err(),
        pd.messaging().subscribe().unwrap_err(),
        pd.midi().add_listener(|_| {}).unwrap_err(),
        pd.midi().on_note_on(|_| {}).unwrap_err(),
        pd.midi().subscribe().unwrap_err(),
    ];
    for err in errors {
        assert!(err.is_use_after_dispose(), "unexpected error: {}", err);
    }
}

#[test]
fn missing_patch_is_reported() {
    let pd = instance();
    let err = pd.open_patch("does/not/exist.pd").unwrap_err();
    assert!(matches!(err, PdError::PatchNotFound(_)));
    assert_eq!(pd.open_patches().unwrap(), 0);
}

#[test]
fn array_range_errors() {
    let pd = instance();
    let _patch = pd.open_patch(fixture()).unwrap();
    let array = pd.array("array1").unwrap();

    assert!(matches!(
        array.read(120, 16),
        Err(PdError::OutOfRange { size: 128, .. })
    ));
    assert!(matches!(
        array.write(128, &[1.0]),
        Err(PdError::OutOfRange { .. })
    ));
    assert!(matches!(
        array.read(usize::MAX, 2),
        Err(PdError::OutOfRange { .. })
    ));
    assert!(matches!(array.resize(0), Err(PdError::OutOfRange { .. })));

    // Exactly up to the end is fine
    array.write(126, &[3.0, 4.0]).unwrap();
    assert_eq!(array.read(126, 2).unwrap(), vec![3.0, 4.0]);
    assert!(array.read(0, 0).unwrap().is_empty());
}

#[test]
fn array_lookup_errors() {
    let pd = instance();
    assert!(matches!(pd.array(""), Err(PdError::InvalidName(_))));
    assert!(matches!(pd.array("nope"), Err(PdError::ArrayNotFound(_))));

    let patch = pd.open_patch(fixture()).unwrap();
    let array = pd.array("array1").unwrap();
    patch.dispose().unwrap();
    assert!(matches!(array.size(), Err(PdError::ArrayNotFound(_))));
}

#[test]
fn resize_keeps_existing_values() {
    let pd = instance();
    let _patch = pd.open_patch(fixture()).unwrap();
    let array = pd.array("array1").unwrap();

    array.write(0, &[1.0, 2.0, 3.0]).unwrap();
    array.resize(256).unwrap();
    assert_eq!(array.read(0, 3).unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(array.read(250, 6).unwrap(), vec![0.0; 6]);

    array.resize(2).unwrap();
    assert_eq!(array.size().unwrap(), 2);
    assert!(array.read(0, 3).is_err());
}

#[test]
fn unbound_sends_are_dropped() {
    let pd = instance();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    pd.messaging()
        .add_listener(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    pd.messaging().send("spam", 1.0).unwrap();
    pd.messaging().bind("spam").unwrap();
    pd.messaging().send("spam", 2.0).unwrap();
    pd.messaging().unbind("spam").unwrap();
    pd.messaging().send("spam", 3.0).unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(pd.messaging().bound_receivers().unwrap().is_empty());
}

#[test]
fn delivery_is_synchronous_and_exactly_once() {
    let pd = instance();
    pd.messaging().bind("spam").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    pd.messaging()
        .on_receiver("spam", move |msg| s.lock().unwrap().push(msg.clone()))
        .unwrap();

    pd.messaging().send_bang("spam").unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![Message::Bang]);
    pd.messaging().send_float("spam", 1.5).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn removed_listener_is_not_called() {
    let pd = instance();
    pd.messaging().bind("spam").unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let id = pd
        .messaging()
        .add_listener(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    pd.messaging().send("spam", 1.0).unwrap();
    assert!(pd.messaging().remove_listener(id).unwrap());
    assert!(!pd.messaging().remove_listener(id).unwrap());
    pd.messaging().send("spam", 1.0).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn listener_may_send_on_its_own_instance() {
    let pd = instance();
    pd.messaging().bind("ping").unwrap();
    pd.messaging().bind("pong").unwrap();
    let rx = pd.messaging().subscribe().unwrap();

    let inner = pd.clone();
    pd.messaging()
        .on_receiver("ping", move |msg| {
            inner.messaging().send("pong", msg.clone()).unwrap();
        })
        .unwrap();

    pd.messaging().send("ping", 5.0).unwrap();
    let receivers: Vec<String> = rx.try_iter().map(|e| e.receiver).collect();
    assert_eq!(receivers, vec!["ping".to_string(), "pong".to_string()]);

    // Breaks the listener -> instance reference cycle
    pd.dispose().unwrap();
}

#[test]
fn invalid_names_rejected() {
    let pd = instance();
    assert!(matches!(
        pd.messaging().bind(""),
        Err(PdError::InvalidName(_))
    ));
    assert!(matches!(
        pd.messaging().send("a b", 1.0),
        Err(PdError::InvalidName(_))
    ));
}

#[test]
fn midi_thru_and_validation() {
    let pd = instance();
    let _patch = pd.open_patch(fixture()).unwrap();
    let rx = pd.midi().subscribe().unwrap();

    pd.midi().send_control_change(0, 7, 100).unwrap();
    // The fixture has no program-change thru
    pd.midi().send_program_change(0, 5).unwrap();
    assert!(matches!(
        pd.midi().send_note_on(0, 200, 10),
        Err(PdError::InvalidMidi { field: "pitch", .. })
    ));

    let events: Vec<MidiEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![MidiEvent::ControlChange {
            channel: 0,
            controller: 7,
            value: 100
        }]
    );
}

#[test]
fn midi_without_patch_is_silent() {
    let pd = instance();
    let rx = pd.midi().subscribe().unwrap();
    pd.midi().send_note_on(0, 60, 100).unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn process_without_patch_outputs_silence() {
    let pd = instance();
    pd.start().unwrap();
    let len = 2 * pd.block_size() * 2;
    let mut out = vec![1.0f32; len];
    pd.process(2, &vec![1.0; len], &mut out).unwrap();
    assert!(out.iter().all(|&s| s == 0.0));
}

#[test]
fn process_leaves_excess_output_untouched() {
    let pd = instance();
    let _patch = pd.open_patch(fixture()).unwrap();
    pd.start().unwrap();
    let len = 2 * pd.block_size();
    let mut out = vec![9.0f32; len + 4];
    pd.process(1, &vec![0.5; len + 4], &mut out).unwrap();
    assert!(out[..len].iter().all(|&s| s == 0.5));
    assert_eq!(&out[len..], &[9.0; 4]);

    let mut short = vec![0.0f32; len - 1];
    assert!(matches!(
        pd.process(1, &vec![0.5; len], &mut short),
        Err(PdError::BufferSize {
            direction: "Output",
            ..
        })
    ));
}

#[test]
fn process_rejects_overflowing_tick_counts() {
    let pd = instance();
    pd.start().unwrap();
    let mut out = vec![0.0f32; 128];

    let err = pd.process(usize::MAX / 2, &[0.0; 128], &mut out).unwrap_err();
    assert!(matches!(
        err,
        PdError::BufferSize {
            direction: "Input",
            expected: usize::MAX,
            actual: 128,
        }
    ));
    assert!(pd.process(usize::MAX, &[0.0; 128], &mut out).is_err());

    // The instance is still usable afterwards
    pd.process(1, &[0.0; 128], &mut out).unwrap();
}

#[test]
fn array_survives_while_another_patch_declares_it() {
    let pd = instance();
    let first = pd.open_patch(fixture()).unwrap();
    let second = pd.open_patch(fixture()).unwrap();
    let array = pd.array("array1").unwrap();

    first.dispose().unwrap();
    assert!(second.is_open());
    assert_eq!(pd.array("array1").unwrap().size().unwrap(), 128);
    assert_eq!(array.read(0, 1).unwrap().len(), 1);

    second.dispose().unwrap();
    assert!(matches!(pd.array("array1"), Err(PdError::ArrayNotFound(_))));
}
