// ABOUTME: Environment variable filtering for sandbox sessions
// ABOUTME: Drops variables whose names look like credentials before they leave the host

use relay_config::SENSITIVE_ENV_SUBSTRINGS;
use std::collections::HashMap;
use tracing::warn;

/// Remove variables whose uppercased name contains a credential-like
/// substring. The name is the only signal; values are never inspected.
pub fn filter_env_vars(vars: HashMap<String, String>) -> HashMap<String, String> {
    vars.into_iter()
        .filter(|(name, _)| {
            let upper = name.to_uppercase();
            let sensitive = SENSITIVE_ENV_SUBSTRINGS
                .iter()
                .any(|marker| upper.contains(marker));
            if sensitive {
                warn!("Dropping sensitive environment variable: {}", name);
            }
            !sensitive
        })
        .collect()
}
