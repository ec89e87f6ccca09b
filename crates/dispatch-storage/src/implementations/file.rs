//! File-based storage backend.
//!
//! Each record is one JSON file under `storage_path`. Writes go to a
//! temporary file that is then renamed over the target, so a reader never
//! sees a half-written record.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dispatch_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::PathBuf;
use tokio::fs;

const DEFAULT_STORAGE_PATH: &str = "./data/orders";

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Maps a storage key to a file name.
	///
	/// ASCII alphanumerics and `-` are kept. Every other byte, `_` included,
	/// is written as `_` plus two hex digits, so distinct keys never share a
	/// file and no key can leave the base directory.
	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path.join(format!("{}.json", encode_key(key)))
	}
}

fn encode_key(key: &str) -> String {
	let mut encoded = String::with_capacity(key.len());
	for byte in key.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' {
			encoded.push(char::from(byte));
		} else {
			encoded.push_str(&format!("_{:02X}", byte));
		}
	}
	encoded
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		match fs::read(&path).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(path) if !path.trim().is_empty() => Ok(()),
					_ => Err("storage_path cannot be empty".to_string()),
				}
			})],
		);
		schema.validate(config)
	}
}

/// Creates a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: directory holding the records (default: "./data/orders")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	tracing::debug!(path = %storage_path, "Using file storage");
	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

pub struct Registry;

impl dispatch_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_roundtrip_and_delete() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().join("orders"));

		assert!(!storage.exists("orders:a1").await.unwrap());
		storage.set_bytes("orders:a1", b"{\"x\":1}".to_vec()).await.unwrap();
		assert!(storage.exists("orders:a1").await.unwrap());
		assert_eq!(
			storage.get_bytes("orders:a1").await.unwrap(),
			b"{\"x\":1}".to_vec()
		);

		storage.delete("orders:a1").await.unwrap();
		storage.delete("orders:a1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("orders:a1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_keys_cannot_escape_base_path() {
		let temp_dir = TempDir::new().unwrap();
		let base = temp_dir.path().join("orders");
		let storage = FileStorage::new(base.clone());

		let path = storage.get_file_path("../../etc/passwd");
		assert_eq!(path.parent().unwrap(), base.as_path());

		storage.set_bytes("../escape", b"x".to_vec()).await.unwrap();
		assert!(!temp_dir.path().join("escape.json").exists());
	}

	#[tokio::test]
	async fn test_no_temp_files_left_behind() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());

		storage.set_bytes("orders:1", b"1".to_vec()).await.unwrap();
		storage.set_bytes("orders:1", b"2".to_vec()).await.unwrap();

		let names: Vec<_> = std::fs::read_dir(temp_dir.path())
			.unwrap()
			.map(|entry| entry.unwrap().file_name().into_string().unwrap())
			.collect();
		assert_eq!(names, vec!["orders_3A1.json".to_string()]);
	}

	#[tokio::test]
	async fn test_keys_differing_in_punctuation_stay_distinct() {
		let temp_dir = TempDir::new().unwrap();
		let storage = FileStorage::new(temp_dir.path().to_path_buf());

		storage
			.set_bytes("order_by_number:CV/1", b"\"a\"".to_vec())
			.await
			.unwrap();
		assert!(!storage.exists("order_by_number:CV_1").await.unwrap());
		assert!(!storage.exists("order_by_number_CV/1").await.unwrap());

		storage
			.set_bytes("order_by_number:CV_1", b"\"b\"".to_vec())
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("order_by_number:CV/1").await.unwrap(),
			b"\"a\"".to_vec()
		);
		assert_eq!(
			storage.get_bytes("order_by_number:CV_1").await.unwrap(),
			b"\"b\"".to_vec()
		);
	}

	#[test]
	fn test_key_encoding() {
		assert_eq!(encode_key("orders:a-1"), "orders_3Aa-1");
		assert_eq!(encode_key("a_b"), "a_5Fb");
		assert_eq!(encode_key("a/b"), "a_2Fb");
		assert_eq!(encode_key("é"), "_C3_A9");
	}

	#[test]
	fn test_config_validation() {
		let config: toml::Value = toml::from_str("storage_path = \"\"").unwrap();
		assert!(create_storage(&config).is_err());

		let config: toml::Value = toml::from_str("storage_path = 5").unwrap();
		assert!(matches!(
			create_storage(&config),
			Err(StorageError::Configuration(_))
		));
	}
}
