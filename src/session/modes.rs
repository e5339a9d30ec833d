//! Active mode stack, most recent first with the base mode implicitly last

use crate::error::{Error, Result};
use crate::BASE_MODE;

#[derive(Debug, Clone, Default)]
pub struct ModeStack {
    modes: Vec<String>,
}

impl ModeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `mode` to the front, inserting it if needed
    pub fn activate(&mut self, mode: &str) -> Result<()> {
        if mode == BASE_MODE {
            return Err(Error::ReservedMode(mode.to_string()));
        }
        self.modes.retain(|m| m != mode);
        self.modes.insert(0, mode.to_string());
        Ok(())
    }

    /// Returns true if the mode was active
    pub fn deactivate(&mut self, mode: &str) -> Result<bool> {
        if mode == BASE_MODE {
            return Err(Error::ReservedMode(mode.to_string()));
        }
        let before = self.modes.len();
        self.modes.retain(|m| m != mode);
        Ok(self.modes.len() != before)
    }

    /// `[most recent, ..., __BASE__]`
    pub fn active(&self) -> Vec<&str> {
        self.modes
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(BASE_MODE))
            .collect()
    }

    pub fn contains(&self, mode: &str) -> bool {
        mode == BASE_MODE || self.modes.iter().any(|m| m == mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_first() {
        let mut stack = ModeStack::new();
        stack.activate("A").unwrap();
        stack.activate("B").unwrap();
        stack.activate("C").unwrap();
        assert_eq!(stack.active(), vec!["C", "B", "A", BASE_MODE]);

        assert!(stack.deactivate("B").unwrap());
        assert_eq!(stack.active(), vec!["C", "A", BASE_MODE]);

        stack.activate("A").unwrap();
        assert_eq!(stack.active(), vec!["A", "C", BASE_MODE]);
    }

    #[test]
    fn test_base_mode_is_reserved() {
        let mut stack = ModeStack::new();
        assert!(matches!(stack.activate(BASE_MODE), Err(Error::ReservedMode(_))));
        assert!(matches!(stack.deactivate(BASE_MODE), Err(Error::ReservedMode(_))));
        assert!(stack.contains(BASE_MODE));
    }

    #[test]
    fn test_deactivate_inactive_is_noop() {
        let mut stack = ModeStack::new();
        assert!(!stack.deactivate("SHIFT").unwrap());
        assert_eq!(stack.active(), vec![BASE_MODE]);
    }
}
