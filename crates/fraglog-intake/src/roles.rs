use crate::model::Role;

/// Resolves the 1-based role indices used throughout the raw payload to the
/// role entries they point at. Pure lookup over the document's role list.
#[derive(Debug, Clone, Copy)]
pub struct RoleTable<'a> {
    roles: &'a [Role],
}

impl<'a> RoleTable<'a> {
    pub fn new(roles: &'a [Role]) -> Self {
        Self { roles }
    }

    /// Looks up a 1-based index; `None` for anything outside `1..=len`.
    pub fn resolve(&self, index: i64) -> Option<&'a Role> {
        if index < 1 {
            return None;
        }
        self.roles.get(index as usize - 1)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
