use crate::env::{env_or, EVENT_LOG_APP_NAME_ENV};

/// Name used when the executable path cannot be resolved.
pub const FALLBACK_APP_NAME: &str = "APP_Name";

/// Display name of the running process.
///
/// `EVENT_LOG_APP_NAME` wins when set; otherwise the executable's file
/// name, or [`FALLBACK_APP_NAME`].
pub fn app_name() -> String {
    let from_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| FALLBACK_APP_NAME.to_string());

    env_or(EVENT_LOG_APP_NAME_ENV, &from_exe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_non_empty_name() {
        assert!(!app_name().is_empty());
    }
}
