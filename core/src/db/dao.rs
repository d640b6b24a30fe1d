use anyhow::Result;

/// Basic persistence operations shared by every entity table.
///
/// Batch writes run inside a single transaction: `insert` is all-or-nothing,
/// `update` and `delete` report how many rows they touched (zero for keys
/// that are not stored).
pub trait Dao {
    type Entity;
    type Key;

    fn insert(&self, items: &[Self::Entity]) -> Result<()>;

    fn update(&self, items: &[Self::Entity]) -> Result<usize>;

    fn delete(&self, items: &[Self::Entity]) -> Result<usize>;

    fn get(&self, key: Self::Key) -> Result<Option<Self::Entity>>;

    fn get_all(&self) -> Result<Vec<Self::Entity>>;

    fn insert_one(&self, item: &Self::Entity) -> Result<()> {
        self.insert(std::slice::from_ref(item))
    }

    fn update_one(&self, item: &Self::Entity) -> Result<bool> {
        Ok(self.update(std::slice::from_ref(item))? > 0)
    }

    fn delete_one(&self, item: &Self::Entity) -> Result<bool> {
        Ok(self.delete(std::slice::from_ref(item))? > 0)
    }
}
