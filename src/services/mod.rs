pub mod auth_service;
pub mod access;
pub mod folder_store;
