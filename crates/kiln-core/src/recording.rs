//! Command buffer recording state machine.
//!
//! A command buffer moves `Initial -> Recording -> Executable`, and back to
//! `Recording` through a reset. While recording, at most one render pass is
//! active, and the pass tracks the current subpass. Every operation checks
//! its required state here before touching the backend, so an illegal
//! sequence fails with an invalid-argument error and records nothing.

use crate::error::{Result, RhiError};

/// Top-level recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordingState {
    #[default]
    Initial,
    Recording,
    Executable,
}

/// The render pass currently open in a recording command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivePass {
    pub subpass: u32,
    pub subpass_count: u32,
}

/// Recording state plus the render pass sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandState {
    state: RecordingState,
    pass: Option<ActivePass>,
}

impl CommandState {
    pub const fn new() -> Self {
        Self {
            state: RecordingState::Initial,
            pass: None,
        }
    }

    pub const fn state(&self) -> RecordingState {
        self.state
    }

    /// The open render pass, if any.
    pub const fn active_pass(&self) -> Option<ActivePass> {
        self.pass
    }

    pub const fn is_recording(&self) -> bool {
        matches!(self.state, RecordingState::Recording)
    }

    /// Return to `Initial`, dropping any pass. Legal from every state.
    pub fn init(&mut self) {
        self.state = RecordingState::Initial;
        self.pass = None;
    }

    /// `Initial -> Recording`.
    pub fn begin(&mut self) -> Result<()> {
        match self.state {
            RecordingState::Initial => {
                self.state = RecordingState::Recording;
                Ok(())
            }
            other => Err(wrong_state("begin", other)),
        }
    }

    /// `Recording -> Executable`. Fails while a render pass is open.
    pub fn close(&mut self) -> Result<()> {
        self.require_recording("close")?;
        if self.pass.is_some() {
            return Err(RhiError::invalid("close called with a render pass still open"));
        }
        self.state = RecordingState::Executable;
        Ok(())
    }

    /// `Recording | Executable -> Recording`, dropping any pass.
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            RecordingState::Recording | RecordingState::Executable => {
                self.state = RecordingState::Recording;
                self.pass = None;
                Ok(())
            }
            other => Err(wrong_state("reset", other)),
        }
    }

    /// Open a pass with `subpass_count` subpasses, starting at `first_subpass`.
    pub fn begin_pass(&mut self, subpass_count: u32, first_subpass: u32) -> Result<()> {
        self.require_no_pass("begin_render_pass")?;
        if first_subpass >= subpass_count {
            return Err(RhiError::invalid(format!(
                "subpass {first_subpass} out of range, render pass has {subpass_count}"
            )));
        }
        self.pass = Some(ActivePass {
            subpass: first_subpass,
            subpass_count,
        });
        Ok(())
    }

    /// Advance to the next subpass.
    pub fn next_subpass(&mut self) -> Result<u32> {
        let pass = self.require_pass_mut("next_subpass")?;
        if pass.subpass + 1 >= pass.subpass_count {
            return Err(RhiError::invalid(format!(
                "next_subpass past the last subpass ({})",
                pass.subpass_count - 1
            )));
        }
        pass.subpass += 1;
        Ok(pass.subpass)
    }

    /// Close the open pass.
    pub fn end_pass(&mut self) -> Result<()> {
        self.require_pass("end_render_pass")?;
        self.pass = None;
        Ok(())
    }

    pub fn require_recording(&self, op: &str) -> Result<()> {
        if self.is_recording() {
            Ok(())
        } else {
            Err(wrong_state(op, self.state))
        }
    }

    pub fn require_executable(&self, op: &str) -> Result<()> {
        match self.state {
            RecordingState::Executable => Ok(()),
            other => Err(wrong_state(op, other)),
        }
    }

    /// Recording with a render pass open.
    pub fn require_pass(&self, op: &str) -> Result<ActivePass> {
        self.require_recording(op)?;
        self.pass
            .ok_or_else(|| RhiError::invalid(format!("{op} requires an active render pass")))
    }

    /// Recording with no render pass open.
    pub fn require_no_pass(&self, op: &str) -> Result<()> {
        self.require_recording(op)?;
        if self.pass.is_some() {
            return Err(RhiError::invalid(format!(
                "{op} is not allowed inside a render pass"
            )));
        }
        Ok(())
    }

    fn require_pass_mut(&mut self, op: &str) -> Result<&mut ActivePass> {
        self.require_recording(op)?;
        self.pass
            .as_mut()
            .ok_or_else(|| RhiError::invalid(format!("{op} requires an active render pass")))
    }
}

fn wrong_state(op: &str, state: RecordingState) -> RhiError {
    RhiError::invalid(format!("{op} is not legal in the {state:?} state"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_only_from_initial() {
        let mut state = CommandState::new();
        assert!(state.begin().is_ok());
        assert!(state.begin().unwrap_err().is_invalid_argument());

        state.close().unwrap();
        assert!(state.begin().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn close_only_from_recording() {
        let mut state = CommandState::new();
        assert!(state.close().unwrap_err().is_invalid_argument());

        state.begin().unwrap();
        state.close().unwrap();
        assert_eq!(state.state(), RecordingState::Executable);
        assert!(state.close().unwrap_err().is_invalid_argument());
    }

    #[test]
    fn reset_from_recording_or_executable() {
        let mut state = CommandState::new();
        assert!(state.reset().unwrap_err().is_invalid_argument());

        state.begin().unwrap();
        assert!(state.reset().is_ok());
        assert_eq!(state.state(), RecordingState::Recording);

        state.close().unwrap();
        assert!(state.reset().is_ok());
        assert_eq!(state.state(), RecordingState::Recording);
    }

    #[test]
    fn init_returns_to_initial_from_anywhere() {
        let mut state = CommandState::new();
        state.begin().unwrap();
        state.begin_pass(2, 0).unwrap();
        state.init();
        assert_eq!(state.state(), RecordingState::Initial);
        assert!(state.active_pass().is_none());
    }

    #[test]
    fn subpass_walk() {
        let mut state = CommandState::new();
        assert!(state.begin_pass(3, 0).is_err());

        state.begin().unwrap();
        state.begin_pass(3, 0).unwrap();
        assert!(state.begin_pass(3, 0).is_err());
        assert_eq!(state.next_subpass(), Ok(1));
        assert_eq!(state.next_subpass(), Ok(2));
        assert!(state.next_subpass().is_err());
        assert!(state.close().is_err());

        state.end_pass().unwrap();
        assert!(state.end_pass().is_err());
        assert!(state.close().is_ok());
    }

    #[test]
    fn begin_pass_at_later_subpass() {
        let mut state = CommandState::new();
        state.begin().unwrap();
        assert!(state.begin_pass(2, 2).is_err());
        state.begin_pass(2, 1).unwrap();
        assert_eq!(state.active_pass().map(|p| p.subpass), Some(1));
    }

    #[test]
    fn reset_drops_open_pass() {
        let mut state = CommandState::new();
        state.begin().unwrap();
        state.begin_pass(1, 0).unwrap();
        state.reset().unwrap();
        assert!(state.require_no_pass("draw").is_ok());
        assert!(state.require_pass("draw").is_err());
    }

    #[test]
    fn executable_is_required_for_present() {
        let mut state = CommandState::new();
        state.begin().unwrap();
        assert!(state.require_executable("present").is_err());
        state.close().unwrap();
        assert!(state.require_executable("present").is_ok());
    }
}
