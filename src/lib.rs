pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod routes;

pub mod crypto {
    pub mod otc;
}

pub mod models {
    pub mod course;
    pub mod entitlement;
    pub mod otc;
    pub mod session;
    pub mod user;
}

pub mod guard {
    pub mod decision;
    pub mod evaluator;
    pub mod redirect;
    pub mod sequence;
}

pub mod identity {
    pub mod client;
    pub mod fixed;
    pub mod http;
}

pub mod notify {
    pub mod http;
    pub mod sender;
}

pub mod repositories {
    pub mod entitlement;
    pub mod memory;
    pub mod otc;
}

pub mod services {
    pub mod catalog;
    pub mod entitlements;
    pub mod otc;
}

pub mod handlers {
    pub mod access;
    pub mod entitlements;
    pub mod guard;
    pub mod health;
    pub mod otc;
    pub mod response;
    pub mod webhooks;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod otc;
}

pub use config::Config;
pub use routes::build_router;
pub use state::AppState;
