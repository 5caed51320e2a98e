#![allow(dead_code)]

use trackhub::{
    parameters::{parameters, ParameterSet},
    EventDescriptor, TrackerId,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub const FACEBOOK: &str = "facebook";
pub const FIREBASE: &str = "firebase";

/// Application event enum in the shape real apps use.
pub enum AppEvent {
    Login,
    Logout,
    Custom(ParameterSet),
    Targeted {
        name: &'static str,
        trackers: Vec<&'static str>,
    },
}

impl EventDescriptor for AppEvent {
    fn name(&self) -> &str {
        match self {
            AppEvent::Login => "login",
            AppEvent::Logout => "logout",
            AppEvent::Custom(_) => "custom",
            AppEvent::Targeted { name, .. } => *name,
        }
    }

    fn parameters(&self) -> ParameterSet {
        match self {
            AppEvent::Custom(params) => params.clone(),
            AppEvent::Targeted { .. } => parameters([("targeted", true)]),
            _ => ParameterSet::new(),
        }
    }

    fn trackers(&self) -> Vec<TrackerId> {
        match self {
            AppEvent::Targeted { trackers, .. } => {
                trackers.iter().map(|id| TrackerId::from(*id)).collect()
            }
            _ => vec![FACEBOOK.into(), FIREBASE.into()],
        }
    }
}
