use bitflags::bitflags;
use smallvec::SmallVec;
use std::cell::Cell;
use std::fmt;
use std::ops::Index;

bitflags! {
    /// Flags describing how a series may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SeriesFlags: u8 {
        /// Lifetime is handled by the heap registry rather than by whoever allocated it.
        const MANAGED = 1 << 0;
        /// Elements can be overwritten, but the length is set for good.
        const FIXED_SIZE = 1 << 1;
        /// Elements are cells.
        const ARRAY = 1 << 2;
        /// No further modification at all.
        const FROZEN = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeriesError {
    #[error("series has a fixed size")]
    FixedSize,
    #[error("series is frozen")]
    Frozen,
    #[error("index {index} is out of range for a series of length {len}")]
    OutOfRange { index: usize, len: usize },
}

thread_local! {
    static LIVE_SERIES: Cell<usize> = const { Cell::new(0) };
}

/// How many series are currently allocated on this thread.
///
/// Every series bumps this on creation and drops it on release, so after a clean shutdown it is
/// back where it started.
pub fn live_series() -> usize {
    LIVE_SERIES.with(Cell::get)
}

fn count_allocation() {
    LIVE_SERIES.with(|live| live.set(live.get() + 1));
}

/// A length-tracked run of same-width elements.
///
/// A series of a single element keeps it inline, and only moves to heap storage ("goes dynamic")
/// when it grows past that.
pub struct Series<T> {
    flags: SeriesFlags,
    data: SmallVec<[T; 1]>,
}

impl<T> Series<T> {
    pub fn new(flags: SeriesFlags) -> Self {
        Self::with_capacity(0, flags)
    }

    pub fn with_capacity(capacity: usize, flags: SeriesFlags) -> Self {
        count_allocation();
        Self { flags, data: SmallVec::with_capacity(capacity) }
    }

    pub fn from_vec(items: Vec<T>, flags: SeriesFlags) -> Self {
        count_allocation();
        Self { flags, data: SmallVec::from_vec(items) }
    }

    pub fn flags(&self) -> SeriesFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: SeriesFlags) {
        self.flags.insert(flags);
    }

    /// Makes the series permanently read-only.
    pub fn freeze(&mut self) {
        self.flags.insert(SeriesFlags::FROZEN);
    }

    pub fn is_frozen(&self) -> bool {
        self.flags.contains(SeriesFlags::FROZEN)
    }

    /// Whether the content lives out of line.
    pub fn is_dynamic(&self) -> bool {
        self.data.spilled()
    }

    /// Size in bytes of one element.
    pub fn width(&self) -> usize {
        std::mem::size_of::<T>()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Mutable access to one element. Allowed on fixed-size series, refused on frozen ones.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T, SeriesError> {
        self.check_writable()?;
        let len = self.data.len();
        self.data.get_mut(index).ok_or(SeriesError::OutOfRange { index, len })
    }

    pub fn set(&mut self, index: usize, item: T) -> Result<(), SeriesError> {
        *self.get_mut(index)? = item;
        Ok(())
    }

    pub fn push(&mut self, item: T) -> Result<(), SeriesError> {
        self.check_resizable()?;
        self.data.push(item);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, item: T) -> Result<(), SeriesError> {
        self.check_resizable()?;
        if index > self.data.len() {
            return Err(SeriesError::OutOfRange { index, len: self.data.len() });
        }
        self.data.insert(index, item);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<T, SeriesError> {
        self.check_resizable()?;
        if index >= self.data.len() {
            return Err(SeriesError::OutOfRange { index, len: self.data.len() });
        }
        Ok(self.data.remove(index))
    }

    pub fn truncate(&mut self, len: usize) -> Result<(), SeriesError> {
        self.check_resizable()?;
        self.data.truncate(len);
        Ok(())
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) -> Result<(), SeriesError> {
        self.check_resizable()?;
        self.data.extend(items);
        Ok(())
    }

    /// Empties the series whatever its flags say. Only meant for tearing the heap down.
    pub fn decay(&mut self) {
        self.data.clear();
    }

    fn check_writable(&self) -> Result<(), SeriesError> {
        if self.is_frozen() {
            return Err(SeriesError::Frozen);
        }
        Ok(())
    }

    fn check_resizable(&self) -> Result<(), SeriesError> {
        self.check_writable()?;
        if self.flags.contains(SeriesFlags::FIXED_SIZE) {
            return Err(SeriesError::FixedSize);
        }
        Ok(())
    }
}

impl<T: Clone> Series<T> {
    /// Copies the content into a new series with the given flags. The copy is never frozen or fixed.
    pub fn copy_with(&self, flags: SeriesFlags) -> Self {
        Self::from_vec(self.data.to_vec(), flags - (SeriesFlags::FROZEN | SeriesFlags::FIXED_SIZE))
    }
}

impl<T: Clone> Clone for Series<T> {
    fn clone(&self) -> Self {
        count_allocation();
        Self { flags: self.flags, data: self.data.clone() }
    }
}

impl<T> Drop for Series<T> {
    fn drop(&mut self) {
        LIVE_SERIES.with(|live| live.set(live.get().saturating_sub(1)));
    }
}

impl<T> Index<usize> for Series<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.data[index]
    }
}

impl<T> FromIterator<T> for Series<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        count_allocation();
        Self { flags: SeriesFlags::empty(), data: iter.into_iter().collect() }
    }
}

impl<T: fmt::Debug> fmt::Debug for Series<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Series").field("flags", &self.flags).field("data", &self.data.as_slice()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_element_stays_inline() {
        let mut series = Series::new(SeriesFlags::empty());
        series.push(1u32).unwrap();
        assert!(!series.is_dynamic());
        series.push(2).unwrap();
        assert!(series.is_dynamic());
        assert_eq!(series.as_slice(), &[1, 2]);
    }

    #[test]
    fn fixed_size_allows_overwrites_only() {
        let mut series = Series::from_vec(vec!['a', 'b'], SeriesFlags::FIXED_SIZE);
        series.set(1, 'c').unwrap();
        assert_eq!(series[1], 'c');
        assert_eq!(series.push('d'), Err(SeriesError::FixedSize));
        assert_eq!(series.remove(0), Err(SeriesError::FixedSize));
    }

    #[test]
    fn frozen_refuses_everything() {
        let mut series = Series::from_vec(vec![1, 2, 3], SeriesFlags::empty());
        series.freeze();
        assert_eq!(series.set(0, 9), Err(SeriesError::Frozen));
        assert_eq!(series.push(4), Err(SeriesError::Frozen));
        let copy = series.copy_with(series.flags());
        assert!(!copy.is_frozen());
    }

    #[test]
    fn out_of_range_is_reported() {
        let mut series: Series<u8> = Series::new(SeriesFlags::empty());
        assert_eq!(series.insert(2, 0), Err(SeriesError::OutOfRange { index: 2, len: 0 }));
        assert!(series.get_mut(0).is_err());
    }

    #[test]
    fn allocations_are_counted() {
        let before = live_series();
        let series: Series<u8> = Series::new(SeriesFlags::empty());
        let copy = series.clone();
        assert_eq!(live_series(), before + 2);
        drop(series);
        drop(copy);
        assert_eq!(live_series(), before);
    }
}
