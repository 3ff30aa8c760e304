//! Type-erased extension map for AppState
//!
//! Feature crates (mail transport, planner) register their own state here so
//! the core AppState does not depend on them.

use std::any::{Any, TypeId};
use std::collections::HashMap;

#[derive(Default)]
pub struct Extensions {
	map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a value, replacing any previous value of the same type
	pub fn insert<T: Send + Sync + 'static>(&mut self, val: T) {
		self.map.insert(TypeId::of::<T>(), Box::new(val));
	}

	pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
		self.map.get(&TypeId::of::<T>())?.downcast_ref::<T>()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	#[test]
	fn test_insert_and_get_by_type() {
		let mut ext = Extensions::new();
		ext.insert(Arc::new(42u32));
		ext.insert("transport".to_string());

		assert_eq!(ext.get::<Arc<u32>>().map(|v| **v), Some(42));
		assert_eq!(ext.get::<String>().map(String::as_str), Some("transport"));
		assert!(ext.get::<u64>().is_none());
	}
}

// vim: ts=4
