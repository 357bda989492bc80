pub mod config;
pub mod credential_store;
pub mod directions_client;
pub mod entry_mapper;
pub mod error;
pub mod identity_client;
pub mod itinerary_api_client;
pub mod polyline;
pub mod session_prefs_repository;
pub mod storage;
