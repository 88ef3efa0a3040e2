/// Session configuration.
///
/// Built with `SessionConfig::default()` and refined with `with_*` calls:
///
/// ```ignore
/// let config = SessionConfig::default().with_check_numerics(true);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Label of the device the session runs on, reported in logs
    /// (default: `/local/cpu:0`).
    pub device: String,
    /// Report a zero divisor as `DivideByZero` and any non-finite kernel
    /// output as `NumericOverflow` instead of letting inf/NaN propagate
    /// (default: off).
    pub check_numerics: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: "/local/cpu:0".to_string(),
            check_numerics: false,
        }
    }
}

impl SessionConfig {
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_check_numerics(mut self, check: bool) -> Self {
        self.check_numerics = check;
        self
    }
}
