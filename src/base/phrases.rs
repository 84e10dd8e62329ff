//! Fixed texts the bot replies with.

use rand::seq::SliceRandom;

/// Reply to `!get updates` when nothing has been collected.
pub const NO_UPDATES: &str = "No updates yet.";

/// Reply to a successful `!clear updates`.
pub const UPDATES_CLEARED: &str = "Updates cleared.";

/// Acknowledgements for an accepted post; `{nick}` is replaced with the author's display name.
pub const ACKNOWLEDGEMENTS: &[&str] = &[
    "Thanks for the update {nick}!",
    "Got it {nick}, thanks!",
    "Noted {nick}, that will be in this week's digest.",
    "Cheers {nick}, update received.",
    "Thanks {nick}, I have saved your update.",
];

/// Pick one acknowledgement at random, addressed to `nick`.
pub fn acknowledgement(nick: &str) -> String {
    let template = ACKNOWLEDGEMENTS.choose(&mut rand::thread_rng()).copied().unwrap_or(ACKNOWLEDGEMENTS[0]);

    template.replace("{nick}", nick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledgement_addresses_the_author() {
        for _ in 0..20 {
            let reply = acknowledgement("Alice");

            assert!(reply.contains("Alice"));
            assert!(!reply.contains("{nick}"));
        }
    }

    #[test]
    fn acknowledgement_comes_from_the_fixed_set() {
        let reply = acknowledgement("Bob");

        assert!(ACKNOWLEDGEMENTS.iter().any(|t| t.replace("{nick}", "Bob") == reply));
    }
}
