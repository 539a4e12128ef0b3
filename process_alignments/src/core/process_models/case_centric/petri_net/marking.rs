use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::{Add, AddAssign, Sub, SubAssign};

use super::petri_net_struct::PlaceID;

///
/// Marking of a [`super::PetriNet`]: a multiset of tokens over places
///
/// Places with zero tokens are never stored, so [`Marking::len`] is the number of marked places.
/// Equality and hashing are structural.
///
/// Markings are partially ordered by multiset inclusion: `a <= b` iff every place holds at
/// least as many tokens in `b` as in `a`.
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Marking {
    tokens: BTreeMap<PlaceID, u64>,
}

impl<'de> Deserialize<'de> for Marking {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tokens: BTreeMap<PlaceID, u64> = BTreeMap::deserialize(deserializer)?;
        Ok(tokens.into_iter().collect())
    }
}

impl Marking {
    /// Create an empty marking
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens in place `p`
    pub fn get(&self, p: &PlaceID) -> u64 {
        self.tokens.get(p).copied().unwrap_or(0)
    }

    /// Set the number of tokens in place `p` (0 removes the place)
    pub fn set(&mut self, p: PlaceID, count: u64) {
        if count == 0 {
            self.tokens.remove(&p);
        } else {
            self.tokens.insert(p, count);
        }
    }

    /// Add `count` tokens to place `p`
    pub fn add_tokens(&mut self, p: PlaceID, count: u64) {
        if count > 0 {
            *self.tokens.entry(p).or_insert(0) += count;
        }
    }

    /// Remove up to `count` tokens from place `p`
    ///
    /// Returns the number of tokens that were missing (i.e., could not be removed).
    pub fn remove_tokens(&mut self, p: PlaceID, count: u64) -> u64 {
        let current = self.get(&p);
        self.set(p, current.saturating_sub(count));
        count.saturating_sub(current)
    }

    /// Whether place `p` holds at least one token
    pub fn contains(&self, p: &PlaceID) -> bool {
        self.tokens.contains_key(p)
    }

    /// Number of marked places
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no place is marked
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterate over (place, tokens) pairs in place order
    pub fn iter(&self) -> impl Iterator<Item = (&PlaceID, &u64)> {
        self.tokens.iter()
    }

    /// Iterate over marked places in place order
    pub fn places(&self) -> impl Iterator<Item = &PlaceID> {
        self.tokens.keys()
    }

    /// Total number of tokens
    pub fn total_tokens(&self) -> u64 {
        self.tokens.values().sum()
    }

    /// Keep only the tokens in places satisfying `keep`
    pub fn project<F: Fn(&PlaceID) -> bool>(&self, keep: F) -> Marking {
        Marking {
            tokens: self
                .tokens
                .iter()
                .filter(|(p, _)| keep(p))
                .map(|(p, c)| (*p, *c))
                .collect(),
        }
    }
}

impl FromIterator<(PlaceID, u64)> for Marking {
    fn from_iter<T: IntoIterator<Item = (PlaceID, u64)>>(iter: T) -> Self {
        let mut ret = Marking::new();
        for (p, c) in iter {
            ret.add_tokens(p, c);
        }
        ret
    }
}

impl From<HashMap<PlaceID, u64>> for Marking {
    fn from(value: HashMap<PlaceID, u64>) -> Self {
        value.into_iter().collect()
    }
}

impl AddAssign<&Marking> for Marking {
    fn add_assign(&mut self, rhs: &Marking) {
        for (p, c) in rhs.iter() {
            self.add_tokens(*p, *c);
        }
    }
}

impl SubAssign<&Marking> for Marking {
    fn sub_assign(&mut self, rhs: &Marking) {
        for (p, c) in rhs.iter() {
            self.remove_tokens(*p, *c);
        }
    }
}

impl Add<&Marking> for &Marking {
    type Output = Marking;
    fn add(self, rhs: &Marking) -> Marking {
        let mut ret = self.clone();
        ret += rhs;
        ret
    }
}

impl Sub<&Marking> for &Marking {
    type Output = Marking;
    /// Saturating subtraction: places that reach zero are removed
    fn sub(self, rhs: &Marking) -> Marking {
        let mut ret = self.clone();
        ret -= rhs;
        ret
    }
}

impl PartialOrd for Marking {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let le = self.iter().all(|(p, c)| other.get(p) >= *c);
        let ge = other.iter().all(|(p, c)| self.get(p) >= *c);
        match (le, ge) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}
