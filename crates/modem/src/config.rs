use std::time::Duration;

use crate::link::{AuthType, LinkAuth};

/// Modem profile and dialing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialConfig {
    /// Sent once at startup, without the `AT` prefix. Every one must
    /// succeed.
    pub init_commands: Vec<String>,
    /// Sets up the packet data context before each dial.
    pub context_command: String,
    pub dial_command: String,
    /// Wait before retrying after a failed context setup or dial.
    pub backoff: Duration,
    pub auth: LinkAuth,
    /// Dial as soon as the modem is configured, without waiting for a
    /// request.
    pub dial_on_start: bool,
}

impl Default for DialConfig {
    fn default() -> Self {
        DialConfig {
            init_commands: ["E0", "+IPR=115200", "\\Q3", "&C1", "&D2", "&S0"]
                .map(String::from)
                .to_vec(),
            context_command: "+CGDCONT=1,\"IP\",\"CMNET\"".into(),
            dial_command: "D*99***1#".into(),
            backoff: Duration::from_secs(3),
            auth: LinkAuth {
                kind: AuthType::Any,
                user: "cmnet".into(),
                password: "cmnet".into(),
            },
            dial_on_start: true,
        }
    }
}
