const FALLBACK_MESSAGES: [&str; 4] = [
    "Sorry, I couldn't reach my brain just now. Could you try asking that again?",
    "Hmm, something went wrong on my end. Please try again in a moment.",
    "The connection dropped before I could answer. Mind sending that once more?",
    "I'm having trouble responding right now. You can also reach out through the contact page.",
];

/// Hands out the canned replies in turn so repeated failures don't repeat
/// the same text back to back.
#[derive(Debug, Default)]
pub struct FallbackRotation {
    next: usize,
}

impl FallbackRotation {
    pub fn starting_at(index: usize) -> Self {
        Self { next: index % FALLBACK_MESSAGES.len() }
    }

    pub fn next_message(&mut self) -> &'static str {
        let message = FALLBACK_MESSAGES[self.next];
        self.next = (self.next + 1) % FALLBACK_MESSAGES.len();
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_through_every_message() {
        let mut rotation = FallbackRotation::default();
        let seen: Vec<_> = (0..FALLBACK_MESSAGES.len() + 1).map(|_| rotation.next_message()).collect();
        assert_eq!(&seen[..FALLBACK_MESSAGES.len()], &FALLBACK_MESSAGES[..]);
        assert_eq!(seen[FALLBACK_MESSAGES.len()], FALLBACK_MESSAGES[0]);
        assert_ne!(seen[0], seen[1]);
    }
}
