pub mod label_service;
pub mod object_store;
pub mod photo_repository;
pub mod photo_service;
