use rand::seq::IndexedRandom;

pub const QUEUED: &str = "Waiting in queue...";
pub const CANCELLED: &str = "Cancelled";
pub const COMPLETED: &str = "Completed!";
pub const FAILED: &str = "Failed!";

/// Cosmetic messages rotated while a job is generating.
pub const FLAVOR_MESSAGES: [&str; 9] = [
    "Warming up the digital director's chair...",
    "Teaching pixels to dance...",
    "Brewing a fresh pot of creativity...",
    "Herding cats into a perfect scene...",
    "Polishing the lens of imagination...",
    "Untangling cinematic spaghetti code...",
    "Requesting render farm gnomes for assistance...",
    "Almost there, just adding extra sparkle...",
    "Finalizing the blockbuster hit...",
];

pub fn random_message() -> &'static str {
    FLAVOR_MESSAGES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(FLAVOR_MESSAGES[0])
}
