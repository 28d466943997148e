pub mod cursor;
pub mod day;
pub mod entitlements;
pub mod feed;
pub mod likes_inbox;
pub mod matchmaker;
pub mod moderation;
pub mod payments;
pub mod profile;
pub mod quota;
pub mod rate_window;
pub mod rewind;
pub mod risk;
pub mod safety;
pub mod session;
pub mod swipe;
pub mod telegram;
pub mod telemetry;
