//! Structural reader for PD patch files
//!
//! A `.pd` file is a sequence of `;`-terminated records such as
//! `#X obj 50 50 adc~;` or `#X connect 0 0 1 0;`. This reader keeps the
//! object boxes and connections of every canvas, plus array
//! declarations. It does not evaluate anything.

use std::path::{Path, PathBuf};

use super::super::error::{PdError, PdResult};

/// An object box on a canvas
#[derive(Debug, Clone, PartialEq)]
pub struct PatchObject {
    /// Object class (`adc~`, `notein`, `msg`, `array`, ...)
    pub class: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: usize,
    pub outlet: usize,
    pub to: usize,
    pub inlet: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Canvas {
    pub objects: Vec<PatchObject>,
    pub connections: Vec<Connection>,
}

impl Canvas {
    fn connections_between<'a>(
        &'a self,
        from_class: &'a str,
        to_class: &'a str,
    ) -> impl Iterator<Item = (&'a PatchObject, &'a Connection, &'a PatchObject)> + 'a {
        self.connections.iter().filter_map(move |c| {
            let src = self.objects.get(c.from)?;
            let dst = self.objects.get(c.to)?;
            (src.class == from_class && dst.class == to_class).then_some((src, c, dst))
        })
    }
}

/// Array declared with `#X array <name> <size> float <flags>`
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDecl {
    pub name: String,
    pub size: usize,
}

/// Which MIDI messages a patch passes straight through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MidiThru {
    pub note: bool,
    pub control: bool,
    pub program: bool,
    pub bend: bool,
    pub touch: bool,
    pub poly_touch: bool,
}

/// A parsed patch file
#[derive(Debug, Clone)]
pub struct PatchFile {
    path: PathBuf,
    canvases: Vec<Canvas>,
    arrays: Vec<ArrayDecl>,
}

/// Channel numbers (1-based) addressed by an `adc~`/`dac~` box
fn io_channels(object: &PatchObject) -> Vec<usize> {
    let explicit: Vec<usize> = object
        .args
        .iter()
        .filter_map(|a| a.parse::<usize>().ok())
        .filter(|&c| c > 0)
        .collect();
    if explicit.is_empty() {
        vec![1, 2]
    } else {
        explicit
    }
}

/// Split file contents into records, tracking the line each starts on
fn records(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut out = Vec::new();
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    if escaped == '\n' {
                        line += 1;
                    }
                    token.push(escaped);
                }
            }
            ';' => {
                if !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
                if !tokens.is_empty() {
                    out.push((record_line, std::mem::take(&mut tokens)));
                }
            }
            c if c.is_whitespace() => {
                if c == '\n' {
                    line += 1;
                }
                if !token.is_empty() {
                    tokens.push(std::mem::take(&mut token));
                }
            }
            c => {
                if tokens.is_empty() && token.is_empty() {
                    record_line = line;
                }
                token.push(c);
            }
        }
    }
    out
}

impl PatchFile {
    /// Read and parse a patch from disk
    pub fn load(path: &Path) -> PdResult<Self> {
        if !path.exists() {
            return Err(PdError::PatchNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    /// Parse patch text; `path` is only used for error reporting
    pub fn parse(text: &str, path: &Path) -> PdResult<Self> {
        let err = |line: usize, reason: String| PdError::PatchParse {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut finished: Vec<Canvas> = Vec::new();
        let mut stack: Vec<Canvas> = Vec::new();
        let mut arrays = Vec::new();

        for (line, rec) in records(text) {
            let head = rec[0].as_str();
            let kind = rec.get(1).map(String::as_str).unwrap_or("");

            match (head, kind) {
                ("#N", "canvas") => stack.push(Canvas::default()),
                ("#X", "restore") => {
                    let canvas = stack
                        .pop()
                        .ok_or_else(|| err(line, "restore without open canvas".to_string()))?;
                    finished.push(canvas);
                    let parent = stack
                        .last_mut()
                        .ok_or_else(|| err(line, "restore closed the root canvas".to_string()))?;
                    let class = rec.get(4).cloned().unwrap_or_else(|| "pd".to_string());
                    parent.objects.push(PatchObject {
                        class,
                        args: rec.iter().skip(5).cloned().collect(),
                    });
                }
                ("#X", "connect") => {
                    let canvas = stack
                        .last_mut()
                        .ok_or_else(|| err(line, "connect outside canvas".to_string()))?;
                    let nums: Vec<usize> = rec[2..]
                        .iter()
                        .map(|t| t.parse::<usize>())
                        .collect::<Result<_, _>>()
                        .map_err(|e| err(line, format!("bad connect index: {}", e)))?;
                    if nums.len() != 4 {
                        return Err(err(line, "connect needs 4 indices".to_string()));
                    }
                    canvas.connections.push(Connection {
                        from: nums[0],
                        outlet: nums[1],
                        to: nums[2],
                        inlet: nums[3],
                    });
                }
                ("#X", "array") => {
                    let name = rec
                        .get(2)
                        .cloned()
                        .ok_or_else(|| err(line, "array without name".to_string()))?;
                    let size = rec
                        .get(3)
                        .and_then(|s| s.parse::<usize>().ok())
                        .ok_or_else(|| err(line, format!("array '{}' has no valid size", name)))?;
                    let canvas = stack
                        .last_mut()
                        .ok_or_else(|| err(line, "array outside canvas".to_string()))?;
                    canvas.objects.push(PatchObject {
                        class: "array".to_string(),
                        args: rec[2..].to_vec(),
                    });
                    arrays.push(ArrayDecl { name, size });
                }
                ("#X", "obj") => {
                    let canvas = stack
                        .last_mut()
                        .ok_or_else(|| err(line, "object outside canvas".to_string()))?;
                    // `#X obj x y` with no class is an empty box
                    let class = rec.get(4).cloned().unwrap_or_default();
                    canvas.objects.push(PatchObject {
                        class,
                        args: rec.iter().skip(5).cloned().collect(),
                    });
                }
                ("#X", "msg" | "floatatom" | "symbolatom" | "listbox" | "text" | "scalar") => {
                    let canvas = stack
                        .last_mut()
                        .ok_or_else(|| err(line, format!("{} outside canvas", kind)))?;
                    canvas.objects.push(PatchObject {
                        class: kind.to_string(),
                        args: rec.iter().skip(4).cloned().collect(),
                    });
                }
                // coords, declare, #A data lines and the like carry no boxes
                _ => {}
            }
        }

        let root = stack
            .pop()
            .ok_or_else(|| err(1, "file has no canvas".to_string()))?;
        if !stack.is_empty() {
            return Err(err(1, format!("{} unterminated subpatch(es)", stack.len())));
        }
        finished.insert(0, root);

        Ok(Self {
            path: path.to_path_buf(),
            canvases: finished,
            arrays,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All canvases, root first
    pub fn canvases(&self) -> &[Canvas] {
        &self.canvases
    }

    pub fn arrays(&self) -> &[ArrayDecl] {
        &self.arrays
    }

    /// Zero-based `(input, output)` channel pairs wired `adc~ -> dac~`,
    /// restricted to the given channel counts
    pub fn audio_routes(&self, inputs: usize, outputs: usize) -> Vec<(usize, usize)> {
        let mut routes = Vec::new();
        for canvas in &self.canvases {
            for (adc, conn, dac) in canvas.connections_between("adc~", "dac~") {
                let ins = io_channels(adc);
                let outs = io_channels(dac);
                let (Some(&input), Some(&output)) = (ins.get(conn.outlet), outs.get(conn.inlet))
                else {
                    continue;
                };
                if input <= inputs && output <= outputs {
                    routes.push((input - 1, output - 1));
                }
            }
        }
        routes
    }

    pub fn midi_thru(&self) -> MidiThru {
        let wired = |from: &str, to: &str| {
            self.canvases
                .iter()
                .any(|c| c.connections_between(from, to).next().is_some())
        };
        MidiThru {
            note: wired("notein", "noteout"),
            control: wired("ctlin", "ctlout"),
            program: wired("pgmin", "pgmout"),
            bend: wired("bendin", "bendout"),
            touch: wired("touchin", "touchout"),
            poly_touch: wired("polytouchin", "polytouchout"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRU: &str = "#N canvas 0 0 450 300 12;
#X obj 50 50 adc~;
#X obj 50 200 dac~;
#X obj 200 50 notein;
#X obj 200 200 noteout;
#X connect 0 0 1 0;
#X connect 0 1 1 1;
#X connect 2 0 3 0;
#X connect 2 1 3 1;
#X connect 2 2 3 2;
#N canvas 0 0 450 250 (subpatch) 0;
#X array array1 128 float 2;
#X coords 0 1 128 -1 200 140 1;
#X restore 300 20 graph;
";

    fn parse(text: &str) -> PdResult<PatchFile> {
        PatchFile::parse(text, Path::new("test.pd"))
    }

    #[test]
    fn test_parse_objects_and_arrays() {
        let patch = parse(THRU).unwrap();
        assert_eq!(patch.canvases().len(), 2);
        assert_eq!(patch.canvases()[0].objects.len(), 5);
        assert_eq!(patch.canvases()[0].objects[4].class, "graph");
        assert_eq!(
            patch.arrays(),
            &[ArrayDecl {
                name: "array1".to_string(),
                size: 128
            }]
        );
    }

    #[test]
    fn test_audio_routes() {
        let patch = parse(THRU).unwrap();
        assert_eq!(patch.audio_routes(2, 2), vec![(0, 0), (1, 1)]);
        // Mono host: second channel is not addressable
        assert_eq!(patch.audio_routes(1, 1), vec![(0, 0)]);
    }

    #[test]
    fn test_explicit_channel_args() {
        let text = "#N canvas 0 0 450 300 12;
#X obj 50 50 adc~ 2;
#X obj 50 200 dac~ 1;
#X connect 0 0 1 0;
";
        let patch = parse(text).unwrap();
        assert_eq!(patch.audio_routes(2, 2), vec![(1, 0)]);
    }

    #[test]
    fn test_midi_thru() {
        let thru = parse(THRU).unwrap().midi_thru();
        assert!(thru.note);
        assert!(!thru.control);
    }

    #[test]
    fn test_escaped_semicolon_in_message() {
        let text = "#N canvas 0 0 450 300 12;
#X msg 10 10 \\; pd dsp 1;
#X obj 10 50 adc~;
";
        let patch = parse(text).unwrap();
        assert_eq!(patch.canvases()[0].objects.len(), 2);
        assert_eq!(patch.canvases()[0].objects[1].class, "adc~");
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = parse("#N canvas 0 0 450 300 12;\n#X connect 0 x 1 0;\n").unwrap_err();
        match err {
            PdError::PatchParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {}", other),
        }
        assert!(parse("").is_err());
        assert!(parse("#X obj 1 1 adc~;").is_err());
    }
}
