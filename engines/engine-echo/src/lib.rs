//! # engine-echo
//!
//! A reference engine plugin for testing and development.
//!
//! The echo "language" has no syntax: every non-empty line of a loaded
//! script is queued and one line is logged per frame. Inline code is logged
//! immediately. The cdylib is built as `libpioeechoengine.so`, loadable with
//! `pioe-host --engine echo` from `target/<profile>/`.

use pioe_abi::{EngineDescriptor, Frame, ScriptEngine, Status};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Script suffix routed to this engine.
pub const SUFFIX: &str = "echo";

/// Status returned by `execute_code` for blank input.
pub const EMPTY_CODE: Status = Status(1);

/// An engine that echoes script lines, one per frame.
#[derive(Debug, Default)]
pub struct EchoEngine {
    pending: VecDeque<String>,
    running: bool,
    echoed: u64,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines still waiting for a frame.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Lines echoed so far, from scripts and inline code.
    pub fn echoed(&self) -> u64 {
        self.echoed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn echo(&mut self, frame: Option<Frame>, line: &str) {
        self.echoed += 1;
        match frame {
            Some(frame) => info!(target: "engine", frame = frame.id, "{}", line),
            None => info!(target: "engine", "{}", line),
        }
    }
}

impl ScriptEngine for EchoEngine {
    fn describe(&self) -> EngineDescriptor {
        EngineDescriptor::new("Echo", env!("CARGO_PKG_VERSION"), "echo", SUFFIX)
    }

    fn unload(&mut self) -> Result<(), Status> {
        debug!(target: "engine", dropped = self.pending.len(), "echo unloaded");
        self.pending.clear();
        Ok(())
    }

    fn init(&mut self) -> Result<(), Status> {
        self.pending.clear();
        self.echoed = 0;
        self.running = true;
        info!(target: "engine", "echo initialized");
        Ok(())
    }

    fn frame(&mut self, frame: Frame) -> Result<(), Status> {
        if !self.running {
            return Ok(());
        }
        if let Some(line) = self.pending.pop_front() {
            self.echo(Some(frame), &line);
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), Status> {
        self.running = true;
        info!(target: "engine", "echo started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Status> {
        self.running = false;
        info!(target: "engine", "echo stopped");
        Ok(())
    }

    fn load_script(&mut self, source: &str) -> Result<(), Status> {
        let before = self.pending.len();
        self.pending.extend(
            source
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string),
        );
        debug!(target: "engine", queued = self.pending.len() - before, "script loaded");
        Ok(())
    }

    fn execute_code(&mut self, code: &str) -> Result<(), Status> {
        let code = code.trim();
        if code.is_empty() {
            return Err(EMPTY_CODE);
        }
        self.echo(None, code);
        Ok(())
    }
}

pioe_abi::export_engine!(EchoEngine, EchoEngine::new);

#[cfg(test)]
mod tests {
    use super::*;
    use pioe_abi::{EngineExport, RawEngineDescriptor};
    use std::ffi::CString;

    #[test]
    fn test_describe() {
        let descriptor = EchoEngine::new().describe();
        assert_eq!(descriptor.name, "Echo");
        assert_eq!(descriptor.script_language, "echo");
        assert_eq!(descriptor.script_suffix, "echo");
    }

    #[test]
    fn test_frames_echo_one_line_each() {
        let mut engine = EchoEngine::new();
        engine.init().unwrap();
        engine.load_script("first\n\n  \nsecond\r\nthird\n").unwrap();
        assert_eq!(engine.pending(), 3);

        for id in 0..5 {
            engine.frame(Frame::new(id)).unwrap();
        }
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.echoed(), 3);
    }

    #[test]
    fn test_stopped_engine_holds_lines() {
        let mut engine = EchoEngine::new();
        engine.init().unwrap();
        engine.load_script("a\nb").unwrap();
        engine.stop().unwrap();

        engine.frame(Frame::new(0)).unwrap();
        assert_eq!(engine.pending(), 2);

        engine.start().unwrap();
        engine.frame(Frame::new(1)).unwrap();
        assert_eq!(engine.pending(), 1);
    }

    #[test]
    fn test_execute_code() {
        let mut engine = EchoEngine::new();
        engine.execute_code("hello").unwrap();
        assert_eq!(engine.echoed(), 1);
        assert_eq!(engine.execute_code("  \n"), Err(EMPTY_CODE));
    }

    #[test]
    fn test_init_resets_queue() {
        let mut engine = EchoEngine::new();
        engine.load_script("stale").unwrap();
        engine.init().unwrap();
        assert_eq!(engine.pending(), 0);
        assert!(engine.is_running());
    }

    #[test]
    fn test_through_export() {
        let export = EngineExport::new(EchoEngine::new);

        let mut raw = RawEngineDescriptor::default();
        assert_eq!(unsafe { export.load(&mut raw) }, 0);
        let descriptor = unsafe { raw.to_descriptor() }.unwrap();
        assert_eq!(descriptor.script_suffix, SUFFIX);

        assert_eq!(export.init(), 0);
        let script = CString::new("one\ntwo").unwrap();
        assert_eq!(unsafe { export.load_script(script.as_ptr()) }, 0);
        assert_eq!(export.frame(Frame::new(0)), 0);

        let blank = CString::new("").unwrap();
        assert_eq!(unsafe { export.execute_code(blank.as_ptr()) }, EMPTY_CODE.code());
        assert_eq!(export.unload(), 0);
        assert_eq!(export.init(), Status::FAILED.code());
    }
}
