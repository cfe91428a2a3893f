pub mod espn;

pub use espn::EspnClient;
