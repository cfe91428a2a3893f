pub mod critical;

pub use critical::{CriticalAlert, CriticalAlertClient, CriticalAlertConfig};
