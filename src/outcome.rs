// Flag-submission outcomes, derived from the server's free-text reply.

/// Result of submitting a flag, as far as the user is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Correct,
    AlreadyCompleted,
    Incorrect,
    /// The server said something we do not recognise; shown verbatim.
    Unknown(String),
}

/// Classify a reply message. Case-insensitive; first match wins:
/// exact "task flag owned!" (no surrounding text or whitespace), then
/// "already completed", then "incorrect".
pub fn classify(message: &str) -> Outcome {
    let lowered = message.to_lowercase();
    if lowered == "task flag owned!" {
        Outcome::Correct
    } else if lowered.contains("already completed") {
        Outcome::AlreadyCompleted
    } else if lowered.contains("incorrect") {
        Outcome::Incorrect
    } else {
        Outcome::Unknown(message.to_string())
    }
}

/// Classify a reply that also carries an explicit `success` flag (the v5
/// shape). The boolean decides correct vs. not; the message refines it.
pub fn classify_with_success(success: bool, message: &str) -> Outcome {
    match (success, classify(message)) {
        (true, Outcome::AlreadyCompleted) => Outcome::AlreadyCompleted,
        (true, _) => Outcome::Correct,
        (false, Outcome::Correct) => Outcome::Unknown(message.to_string()),
        (false, other) => other,
    }
}
