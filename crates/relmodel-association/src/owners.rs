//! The owner instances an association handle operates on.

/// One owner, or an ordered collection of owners.
///
/// A single owner behaves as a collection of length one, except for the
/// input-length contract: only a collection requires one input value per
/// owner.
#[derive(Debug)]
pub enum OwnerSet<'a, M> {
    One(&'a mut M),
    Many(&'a mut [M]),
}

impl<M> OwnerSet<'_, M> {
    pub fn len(&self) -> usize {
        match self {
            OwnerSet::One(_) => 1,
            OwnerSet::Many(owners) => owners.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the owners were given as a collection.
    pub fn is_collection(&self) -> bool {
        matches!(self, OwnerSet::Many(_))
    }

    pub fn get(&self, index: usize) -> Option<&M> {
        self.as_slice().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut M> {
        self.as_mut_slice().get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, M> {
        self.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, M> {
        self.as_mut_slice().iter_mut()
    }

    pub fn as_slice(&self) -> &[M] {
        match self {
            OwnerSet::One(owner) => std::slice::from_ref(&**owner),
            OwnerSet::Many(owners) => owners,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [M] {
        match self {
            OwnerSet::One(owner) => std::slice::from_mut(&mut **owner),
            OwnerSet::Many(owners) => owners,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_owner_is_a_collection_of_one() {
        let mut owner = 7_i64;
        let mut set = OwnerSet::One(&mut owner);
        assert_eq!(set.len(), 1);
        assert!(!set.is_collection());
        *set.get_mut(0).expect("owner") += 1;
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![8]);
        assert!(set.get(1).is_none());
    }

    #[test]
    fn collection_keeps_order() {
        let mut owners = vec![1_i64, 2, 3];
        let mut set = OwnerSet::Many(&mut owners);
        assert!(set.is_collection());
        assert_eq!(set.len(), 3);
        for owner in set.iter_mut() {
            *owner *= 10;
        }
        assert_eq!(set.as_slice(), &[10, 20, 30]);
    }
}
