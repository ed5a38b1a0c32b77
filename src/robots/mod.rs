//! Politeness handling module
//!
//! This module fetches and parses robots.txt, turns it into a per-domain
//! [`DomainPolicy`] and exposes the [`PolitenessGate`] every fetch must pass.

mod gate;
mod parser;
mod policy;

pub use gate::{Authorization, PolitenessGate};
pub use parser::ParsedRobots;
pub use policy::{fetch_robots, load_policy, DomainPolicy};
