//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

pub mod automaton {
    pub const PEERS: &str = "/peers";
    pub const STATS: &str = "/stats";
}
