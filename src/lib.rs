pub mod application {
    pub mod account_service;
}

pub mod data {
    pub mod user_repository;
}

pub mod domain {
    pub mod error;
    pub mod gateway;
    pub mod repository;
    pub mod user;
}

pub mod infrastructure {
    pub mod config;
    pub mod logging;
    pub mod point_client;
    pub mod security;
    pub mod token;
}

pub mod presentation {
    pub mod handlers;
    pub mod middleware;
}
