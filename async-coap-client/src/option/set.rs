// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use super::*;

/// Ordered, multi-valued collection of CoAP options.
///
/// Entries are always sorted by option number. Inserting an option whose
/// number is already present places it after the existing ones, so the
/// relative order of repeated options is the order they were added in.
/// This is exactly the order they are delta-encoded on the wire.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct OptionSet {
    entries: Vec<(OptionNumber, Vec<u8>)>,
}

impl OptionSet {
    /// Creates an empty option set.
    pub fn new() -> OptionSet {
        OptionSet::default()
    }

    /// Number of option instances in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the set holds no options.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all options in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (OptionNumber, &[u8])> + '_ {
        self.entries.iter().map(|(n, v)| (*n, v.as_slice()))
    }

    /// Adds a raw option value. Fails if the value is longer than
    /// [`MAX_OPTION_VALUE_SIZE`].
    pub fn insert_raw<V: Into<Vec<u8>>>(
        &mut self,
        number: OptionNumber,
        value: V,
    ) -> Result<(), Error> {
        let value = value.into();
        if value.len() > MAX_OPTION_VALUE_SIZE {
            warn!("option {} too long: {} bytes", number, value.len());
            return Err(Error::InvalidArgument);
        }
        let index = self
            .entries
            .iter()
            .position(|(n, _)| *n > number)
            .unwrap_or_else(|| self.entries.len());
        self.entries.insert(index, (number, value));
        Ok(())
    }

    /// Adds a typed option value.
    pub fn insert<'a, T>(&mut self, key: OptionKey<T>, value: T) -> Result<(), Error>
    where
        T: Into<OptionValue<'a>>,
    {
        self.insert_raw(key.0, value.into().to_bytes())
    }

    /// Replaces every instance of `key` with a single `value`.
    pub fn set<'a, T>(&mut self, key: OptionKey<T>, value: T) -> Result<(), Error>
    where
        T: Into<OptionValue<'a>>,
    {
        self.remove(key.0);
        self.insert(key, value)
    }

    /// Returns the first value for `number`, if present.
    pub fn get_raw(&self, number: OptionNumber) -> Option<&[u8]> {
        self.get_all_raw(number).next()
    }

    /// Iterates over every value for `number`, in insertion order.
    pub fn get_all_raw(&self, number: OptionNumber) -> impl Iterator<Item = &[u8]> + '_ {
        self.entries
            .iter()
            .filter(move |(n, _)| *n == number)
            .map(|(_, v)| v.as_slice())
    }

    /// Decodes the first value for `key`. Returns `None` when the option is
    /// absent or its value is not a valid encoding of `T`.
    pub fn get<'a, T>(&'a self, key: OptionKey<T>) -> Option<T>
    where
        T: TryOptionValueFrom<'a>,
    {
        self.get_raw(key.0).and_then(T::try_option_value_from)
    }

    /// Decodes every value for `key`, skipping values that fail to decode.
    pub fn get_all<'a, T>(&'a self, key: OptionKey<T>) -> impl Iterator<Item = T> + 'a
    where
        T: TryOptionValueFrom<'a> + 'a,
    {
        self.get_all_raw(key.0).filter_map(T::try_option_value_from)
    }

    /// Returns true if at least one instance of `number` is present.
    pub fn contains(&self, number: OptionNumber) -> bool {
        self.entries.iter().any(|(n, _)| *n == number)
    }

    /// Number of instances of `number`.
    pub fn count(&self, number: OptionNumber) -> usize {
        self.get_all_raw(number).count()
    }

    /// Removes every instance of `number`, returning how many were removed.
    pub fn remove(&mut self, number: OptionNumber) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| *n != number);
        before - self.entries.len()
    }

    /// Removes the first instance of `number` whose value equals `value`.
    pub fn remove_value(&mut self, number: OptionNumber, value: &[u8]) -> bool {
        match self
            .entries
            .iter()
            .position(|(n, v)| *n == number && v.as_slice() == value)
        {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes every option.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a OptionSet {
    type Item = (OptionNumber, &'a [u8]);
    type IntoIter = Box<dyn Iterator<Item = (OptionNumber, &'a [u8])> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
