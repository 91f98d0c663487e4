//! Placeholder tokens in URL templates.
//!
//! Substitution is plain string replacement; unknown tokens are left as-is.

pub const PORT: &str = "[port]";
pub const VHOST: &str = "[vhost]";
pub const CHANNEL: &str = "[channel]";
pub const IP: &str = "[ip]";
pub const USERNAME: &str = "[username]";
pub const PASSWORD: &str = "[password]";
pub const START_TIME: &str = "[starttime]";
pub const END_TIME: &str = "[endtime]";

/// Replaces every occurrence of each `(token, value)` pair, in order.
pub fn substitute(template: &str, pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .fold(template.to_string(), |acc, (token, value)| {
            acc.replace(token, value)
        })
}
