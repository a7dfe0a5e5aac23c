use std::collections::HashMap;

/// Field → value mapping stored under a single key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashValue {
    data: HashMap<String, Vec<u8>>,
}

impl HashValue {
    pub fn new() -> Self {
        HashValue {
            data: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Vec<u8>> {
        self.data.get(field)
    }

    /// Set a field. Returns true if the field is new (didn't exist before).
    pub fn set(&mut self, field: String, value: Vec<u8>) -> bool {
        self.data.insert(field, value).is_none()
    }

    pub fn del(&mut self, field: &str) -> bool {
        self.data.remove(field).is_some()
    }

    pub fn exists(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.data.iter()
    }
}
