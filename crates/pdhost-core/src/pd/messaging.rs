//! Instance-scoped message bus
//!
//! Receivers bound here exist only inside the owning instance. Two
//! instances binding the same name get two unrelated subscriptions.

use std::sync::Arc;

use crossbeam::channel::Receiver;

use super::error::PdResult;
use super::instance::{validate_name, Shared};
use super::listeners::ListenerId;
use super::message::{Atom, Message, MessageEvent};

/// Message bus of one instance, obtained from
/// [`PdInstance::messaging`](super::PdInstance::messaging)
pub struct Messaging<'a> {
    shared: &'a Arc<Shared>,
}

impl<'a> Messaging<'a> {
    pub(crate) fn new(shared: &'a Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Subscribe this instance's listeners to messages sent to `receiver`
    pub fn bind(&self, receiver: &str) -> PdResult<()> {
        validate_name(receiver)?;
        self.shared.call(|engine, book| {
            if !book.bound.contains(receiver) {
                engine.bind(receiver)?;
                book.bound.insert(receiver.to_string());
            }
            Ok(())
        })?;
        log::debug!("Instance {}: bound '{}'", self.shared.id(), receiver);
        Ok(())
    }

    /// Remove the subscription; later sends to `receiver` are dropped
    pub fn unbind(&self, receiver: &str) -> PdResult<()> {
        validate_name(receiver)?;
        let removed = self.shared.call(|engine, book| {
            if book.bound.remove(receiver) {
                engine.unbind(receiver)?;
                return Ok(true);
            }
            Ok(false)
        })?;
        if removed {
            log::debug!("Instance {}: unbound '{}'", self.shared.id(), receiver);
        }
        Ok(())
    }

    pub fn is_bound(&self, receiver: &str) -> PdResult<bool> {
        self.shared.with_book(|book| book.bound.contains(receiver))
    }

    /// Currently bound receiver names, sorted
    pub fn bound_receivers(&self) -> PdResult<Vec<String>> {
        self.shared
            .with_book(|book| book.bound.iter().cloned().collect())
    }

    /// Send a message; listeners run before this returns
    pub fn send(&self, receiver: &str, message: impl Into<Message>) -> PdResult<()> {
        validate_name(receiver)?;
        let message = message.into();
        self.shared
            .call(|engine, _| engine.send(receiver, &message))
    }

    pub fn send_bang(&self, receiver: &str) -> PdResult<()> {
        self.send(receiver, Message::Bang)
    }

    pub fn send_float(&self, receiver: &str, value: f32) -> PdResult<()> {
        self.send(receiver, Message::Float(value))
    }

    pub fn send_symbol(&self, receiver: &str, value: &str) -> PdResult<()> {
        self.send(receiver, Message::Symbol(value.to_string()))
    }

    pub fn send_list(&self, receiver: &str, atoms: Vec<Atom>) -> PdResult<()> {
        self.send(receiver, Message::List(atoms))
    }

    pub fn send_message(&self, receiver: &str, selector: &str, args: Vec<Atom>) -> PdResult<()> {
        validate_name(selector)?;
        self.send(
            receiver,
            Message::Typed {
                selector: selector.to_string(),
                args,
            },
        )
    }

    /// Register a callback for every message delivered to this instance
    pub fn add_listener<F>(&self, listener: F) -> PdResult<ListenerId>
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        self.shared
            .with_listeners(|l| l.messages.add(Arc::new(listener)))
    }

    /// Register a callback for messages delivered to one receiver name
    pub fn on_receiver<F>(&self, receiver: &str, listener: F) -> PdResult<ListenerId>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let receiver = receiver.to_string();
        self.add_listener(move |event| {
            if event.receiver == receiver {
                listener(&event.message);
            }
        })
    }

    /// Returns false if the listener was not registered here
    pub fn remove_listener(&self, id: ListenerId) -> PdResult<bool> {
        self.shared.with_listeners(|l| l.messages.remove(id))
    }

    /// Channel receiving every message delivered to this instance
    pub fn subscribe(&self) -> PdResult<Receiver<MessageEvent>> {
        self.shared.with_listeners(|l| l.messages.subscribe())
    }
}
