//! Readiness-waiting collaborator interface.
//!
//! The OS polling layer is an external collaborator: it blocks the whole
//! process until registered descriptors become ready, then the registered
//! callback values run synchronously through the call protocol before
//! control returns. This module owns the registration table and the
//! callback dispatch; the actual wait is injected as a [`ReadyWaiter`].

use std::fmt;

use rustc_hash::FxHashMap;

use skein_diagnostic::Error;

use crate::{Value, Vm};

/// Readiness direction of interest.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PollDirection {
    Read,
    Write,
}

/// Failure from the polling interface.
#[derive(Debug)]
pub enum PollError {
    /// The OS layer failed; carries its rendered reason.
    Wait(String),
    /// A ready callback failed through the call protocol.
    Callback(Error),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Wait(reason) => write!(f, "Failed polling: {reason}"),
            PollError::Callback(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PollError {}

/// The OS-level wait, supplied by the embedding process.
pub trait ReadyWaiter {
    /// Block until at least one registered interest is ready or the
    /// timeout (milliseconds, `None` = indefinite) expires. Returns the
    /// ready subset.
    fn wait(
        &mut self,
        interest: &[(i32, PollDirection)],
        timeout_ms: Option<i64>,
    ) -> Result<Vec<(i32, PollDirection)>, String>;
}

/// Registration table mapping (descriptor, direction) to callback values.
#[derive(Default)]
pub struct PollRegistry {
    files: FxHashMap<(i32, PollDirection), Value>,
}

impl PollRegistry {
    pub fn new() -> Self {
        PollRegistry {
            files: FxHashMap::default(),
        }
    }

    /// Register a callback, replacing any previous one for the same
    /// descriptor and direction.
    pub fn register(&mut self, fd: i32, dir: PollDirection, callback: Value) {
        self.files.insert((fd, dir), callback);
    }

    /// Remove a registration; `false` if none was present.
    pub fn deregister(&mut self, fd: i32, dir: PollDirection) -> bool {
        self.files.remove(&(fd, dir)).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Wait for readiness, invoke the callbacks of every ready
    /// registration, and return the ready count.
    pub fn wait(
        &self,
        vm: &mut Vm,
        waiter: &mut dyn ReadyWaiter,
        timeout_ms: Option<i64>,
    ) -> Result<i64, PollError> {
        let interest: Vec<(i32, PollDirection)> = self.files.keys().copied().collect();
        let ready = waiter.wait(&interest, timeout_ms).map_err(PollError::Wait)?;

        let mut count = 0i64;
        for key in ready {
            if let Some(callback) = self.files.get(&key) {
                let callback = callback.clone();
                vm.call_value(&callback).map_err(PollError::Callback)?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skein_diagnostic::EvalResult;

    /// A canned waiter standing in for the OS layer.
    struct Canned(Vec<(i32, PollDirection)>);

    impl ReadyWaiter for Canned {
        fn wait(
            &mut self,
            _interest: &[(i32, PollDirection)],
            _timeout_ms: Option<i64>,
        ) -> Result<Vec<(i32, PollDirection)>, String> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl ReadyWaiter for Failing {
        fn wait(
            &mut self,
            _interest: &[(i32, PollDirection)],
            _timeout_ms: Option<i64>,
        ) -> Result<Vec<(i32, PollDirection)>, String> {
            Err("interrupted".to_string())
        }
    }

    fn marker(vm: &mut Vm) -> EvalResult {
        vm.push(Value::Int(1));
        Ok(())
    }

    #[test]
    fn ready_callbacks_run_synchronously() {
        let mut vm = Vm::new();
        let imp = vm.add_cfunc("on-ready", [], [], marker);

        let mut reg = PollRegistry::new();
        reg.register(3, PollDirection::Read, Value::Fimp(imp));
        reg.register(4, PollDirection::Write, Value::Fimp(imp));
        assert_eq!(reg.len(), 2);

        let mut waiter = Canned(vec![(3, PollDirection::Read)]);
        let n = reg
            .wait(&mut vm, &mut waiter, Some(10))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(n, 1);
        assert_eq!(vm.scope().take_stack(), vec![Value::Int(1)]);
    }

    #[test]
    fn deregister_removes_interest() {
        let mut reg = PollRegistry::new();
        reg.register(3, PollDirection::Read, Value::Nil);
        assert!(reg.deregister(3, PollDirection::Read));
        assert!(!reg.deregister(3, PollDirection::Read));
        assert!(reg.is_empty());
    }

    #[test]
    fn wait_failure_is_reported() {
        let mut vm = Vm::new();
        let reg = PollRegistry::new();
        let err = reg
            .wait(&mut vm, &mut Failing, None)
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed polling: interrupted");
    }
}
