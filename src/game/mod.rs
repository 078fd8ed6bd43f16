pub mod clock;
pub mod fever;
pub mod gameplay;
pub mod judgment;
pub mod lanes;
pub mod life;
pub mod lifecycle;
pub mod note;
pub mod pattern;
pub mod practice;
pub mod router;
pub mod ruleset;
pub mod scoring;
pub mod timing;
