//! Bounded-memory sorting of a file's integers
//!
//! Files that fit in the sort budget are sorted in memory. Larger files go
//! through an external merge sort:
//!
//! 1. Run formation: budget-sized runs are read, sorted and written to the
//!    swap region.
//! 2. Merge passes: groups of up to `k` runs are k-way merged through small
//!    windows, ping-ponging between the swap region and the file's own
//!    extent until a single run remains.
//! 3. If the final run sits in swap it is copied back over the file.
//!
//! Both strategies use the same codec ([`read_ints_into`], [`write_ints`])
//! and the same comparison (`i32` ordering).

use crate::error::{Result, VdiskError};
use crate::io::BackingStore;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Bytes per stored integer
const INT_SIZE: u64 = 4;

/// Staging buffer for encoding/decoding, independent of the budget
const STAGING_BYTES: usize = 64 * 1024;

/// Preferred minimum merge window (one 4KB block of integers)
const MIN_WINDOW_ELEMENTS: usize = 1024;

/// How a sort will be carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStrategy {
    /// Whole file fits in the budget
    InMemory,
    /// Spill sorted runs to swap and merge them
    ExternalMerge { runs: u64 },
}

impl SortStrategy {
    /// Pick a strategy for `element_count` integers and a budget of
    /// `budget_elements` integers
    pub fn select(element_count: u64, budget_elements: usize) -> Self {
        let budget = budget_elements.max(1) as u64;
        if element_count <= budget {
            SortStrategy::InMemory
        } else {
            SortStrategy::ExternalMerge {
                runs: element_count.div_ceil(budget),
            }
        }
    }
}

/// Summary of a completed sort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortReport {
    pub strategy: SortStrategy,
    pub elements: u64,
    pub merge_passes: u32,
}

/// A sorted run, in elements relative to a region base
#[derive(Debug, Clone, Copy)]
struct Run {
    start: u64,
    len: u64,
}

/// Which region currently holds the runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Area {
    File,
    Swap,
}

/// Read `count` integers at `offset`, appending to `out`
pub fn read_ints_into<S: BackingStore + ?Sized>(
    store: &mut S,
    offset: u64,
    count: u64,
    out: &mut Vec<i32>,
) -> Result<()> {
    let mut staging = vec![0u8; STAGING_BYTES.min((count * INT_SIZE) as usize)];
    let mut done = 0u64;

    while done < count {
        let n = ((count - done) * INT_SIZE).min(STAGING_BYTES as u64) as usize;
        let bytes = &mut staging[..n];
        store.read_into(offset + done * INT_SIZE, bytes)?;
        out.extend(
            bytes
                .chunks_exact(INT_SIZE as usize)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
        done += n as u64 / INT_SIZE;
    }

    Ok(())
}

/// Read `count` integers at `offset`
pub fn read_ints<S: BackingStore + ?Sized>(
    store: &mut S,
    offset: u64,
    count: u64,
) -> Result<Vec<i32>> {
    let mut out = Vec::with_capacity(count as usize);
    read_ints_into(store, offset, count, &mut out)?;
    Ok(out)
}

/// Write `values` at `offset` as little-endian 32-bit integers
pub fn write_ints<S: BackingStore + ?Sized>(
    store: &mut S,
    offset: u64,
    values: &[i32],
) -> Result<()> {
    let per_chunk = STAGING_BYTES / INT_SIZE as usize;
    let mut staging = Vec::with_capacity(STAGING_BYTES.min(values.len() * INT_SIZE as usize));
    let mut position = offset;

    for chunk in values.chunks(per_chunk) {
        staging.clear();
        for value in chunk {
            staging.extend_from_slice(&value.to_le_bytes());
        }
        store.write(position, &staging)?;
        position += staging.len() as u64;
    }

    Ok(())
}

/// Sorts one file's integers within a fixed memory budget
///
/// Holds the store and swap geometry for a single `sort` call; every buffer
/// it allocates is dropped before [`BoundedSorter::sort`] returns.
pub struct BoundedSorter<'a, S: BackingStore + ?Sized> {
    store: &'a mut S,
    budget_elements: usize,
    swap_offset: u64,
    swap_capacity: u64,
}

impl<'a, S: BackingStore + ?Sized> BoundedSorter<'a, S> {
    pub fn new(
        store: &'a mut S,
        budget_elements: usize,
        swap_offset: u64,
        swap_capacity: u64,
    ) -> Self {
        BoundedSorter {
            store,
            budget_elements: budget_elements.max(3),
            swap_offset,
            swap_capacity,
        }
    }

    /// Sort `count` integers stored at `offset` ascending, in place
    pub fn sort(&mut self, offset: u64, count: u64) -> Result<SortReport> {
        let strategy = SortStrategy::select(count, self.budget_elements);

        let merge_passes = match strategy {
            SortStrategy::InMemory => {
                self.sort_in_memory(offset, count)?;
                0
            }
            SortStrategy::ExternalMerge { runs } => self.sort_external(offset, count, runs)?,
        };

        Ok(SortReport {
            strategy,
            elements: count,
            merge_passes,
        })
    }

    fn sort_in_memory(&mut self, offset: u64, count: u64) -> Result<()> {
        let mut values = read_ints(self.store, offset, count)?;
        values.sort_unstable();
        write_ints(self.store, offset, &values)
    }

    fn sort_external(&mut self, offset: u64, count: u64, run_count: u64) -> Result<u32> {
        let needed = count * INT_SIZE;
        if needed > self.swap_capacity {
            return Err(VdiskError::SwapExhausted {
                needed,
                available: self.swap_capacity,
            });
        }

        let mut runs = self.form_runs(offset, count, run_count)?;
        tracing::debug!("Formed {} sorted runs of up to {} elements", runs.len(), self.budget_elements);

        let mut source = Area::Swap;
        let mut passes = 0u32;

        while runs.len() > 1 {
            let target = match source {
                Area::Swap => Area::File,
                Area::File => Area::Swap,
            };
            runs = self.merge_pass(
                &runs,
                self.area_base(source, offset),
                self.area_base(target, offset),
            )?;
            source = target;
            passes += 1;
            tracing::debug!("Merge pass {} left {} runs", passes, runs.len());
        }

        if source == Area::Swap {
            let chunk = self.budget_elements * INT_SIZE as usize;
            self.store.copy(self.swap_offset, offset, needed, chunk)?;
        }

        Ok(passes)
    }

    fn area_base(&self, area: Area, file_offset: u64) -> u64 {
        match area {
            Area::File => file_offset,
            Area::Swap => self.swap_offset,
        }
    }

    /// Sort budget-sized slices of the file into swap
    fn form_runs(&mut self, offset: u64, count: u64, run_count: u64) -> Result<Vec<Run>> {
        let budget = self.budget_elements as u64;
        let mut buffer = Vec::with_capacity(self.budget_elements);
        let mut runs = Vec::with_capacity(run_count as usize);
        let mut start = 0u64;

        while start < count {
            let len = budget.min(count - start);

            buffer.clear();
            read_ints_into(self.store, offset + start * INT_SIZE, len, &mut buffer)?;
            buffer.sort_unstable();
            write_ints(self.store, self.swap_offset + start * INT_SIZE, &buffer)?;

            runs.push(Run { start, len });
            start += len;
        }

        Ok(runs)
    }

    /// Merge groups of runs from `source` into `target`
    fn merge_pass(&mut self, runs: &[Run], source: u64, target: u64) -> Result<Vec<Run>> {
        let max_fan_in = (self.budget_elements / MIN_WINDOW_ELEMENTS)
            .saturating_sub(1)
            .max(2);
        let fan_in = max_fan_in.min(runs.len());
        // k input windows plus one output window share the budget
        let window = (self.budget_elements / (fan_in + 1)).max(1);

        let mut merged = Vec::with_capacity(runs.len().div_ceil(fan_in));
        for group in runs.chunks(fan_in) {
            merged.push(self.merge_group(group, source, target, window)?);
        }

        Ok(merged)
    }

    /// K-way merge of adjacent runs; output lands at the same element
    /// positions in `target`
    fn merge_group(&mut self, group: &[Run], source: u64, target: u64, window: usize) -> Result<Run> {
        let first = group[0].start;
        let total: u64 = group.iter().map(|r| r.len).sum();

        let mut cursors: Vec<RunCursor> =
            group.iter().map(|&run| RunCursor::new(run, window)).collect();
        let mut heap = BinaryHeap::with_capacity(group.len());

        for (i, cursor) in cursors.iter_mut().enumerate() {
            if let Some(value) = cursor.next(self.store, source)? {
                heap.push(Reverse((value, i)));
            }
        }

        let mut output = Vec::with_capacity(window);
        let mut position = first;

        while let Some(Reverse((value, i))) = heap.pop() {
            output.push(value);
            if output.len() == window {
                write_ints(self.store, target + position * INT_SIZE, &output)?;
                position += output.len() as u64;
                output.clear();
            }

            if let Some(next) = cursors[i].next(self.store, source)? {
                heap.push(Reverse((next, i)));
            }
        }

        if !output.is_empty() {
            write_ints(self.store, target + position * INT_SIZE, &output)?;
        }

        Ok(Run {
            start: first,
            len: total,
        })
    }
}

/// Windowed reader over one sorted run
struct RunCursor {
    run: Run,
    loaded: u64,
    window: usize,
    buffer: Vec<i32>,
    position: usize,
}

impl RunCursor {
    fn new(run: Run, window: usize) -> Self {
        RunCursor {
            run,
            loaded: 0,
            window,
            buffer: Vec::with_capacity(window),
            position: 0,
        }
    }

    fn next<S: BackingStore + ?Sized>(&mut self, store: &mut S, base: u64) -> Result<Option<i32>> {
        if self.position == self.buffer.len() {
            if self.loaded == self.run.len {
                return Ok(None);
            }

            let n = (self.window as u64).min(self.run.len - self.loaded);
            let offset = base + (self.run.start + self.loaded) * INT_SIZE;

            self.buffer.clear();
            read_ints_into(store, offset, n, &mut self.buffer)?;
            self.loaded += n;
            self.position = 0;
        }

        let value = self.buffer[self.position];
        self.position += 1;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryStore;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const FILE_OFFSET: u64 = 4096;
    const SWAP_OFFSET: u64 = 2 * 1024 * 1024;
    const SWAP_CAPACITY: u64 = 1024 * 1024;

    fn store_with(values: &[i32]) -> MemoryStore {
        let mut store = MemoryStore::new(SWAP_OFFSET + SWAP_CAPACITY);
        write_ints(&mut store, FILE_OFFSET, values).unwrap();
        store
    }

    fn random_values(count: usize, seed: u64) -> Vec<i32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count).map(|_| rng.gen_range(0..1_000_000)).collect()
    }

    fn sort_with_budget(values: &[i32], budget: usize) -> (Vec<i32>, SortReport) {
        let mut store = store_with(values);
        let report = BoundedSorter::new(&mut store, budget, SWAP_OFFSET, SWAP_CAPACITY)
            .sort(FILE_OFFSET, values.len() as u64)
            .unwrap();
        let sorted = read_ints(&mut store, FILE_OFFSET, values.len() as u64).unwrap();
        (sorted, report)
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(SortStrategy::select(0, 16), SortStrategy::InMemory);
        assert_eq!(SortStrategy::select(16, 16), SortStrategy::InMemory);
        assert_eq!(
            SortStrategy::select(17, 16),
            SortStrategy::ExternalMerge { runs: 2 }
        );
        assert_eq!(
            SortStrategy::select(1_000_000, 524_288),
            SortStrategy::ExternalMerge { runs: 2 }
        );
    }

    #[test]
    fn test_codec_roundtrip_across_staging_chunks() {
        let values: Vec<i32> = (-20_000..20_000).collect();
        let mut store = store_with(&values);
        assert_eq!(
            read_ints(&mut store, FILE_OFFSET, values.len() as u64).unwrap(),
            values
        );
    }

    #[test]
    fn test_in_memory_sort() {
        let values = random_values(500, 1);
        let (sorted, report) = sort_with_budget(&values, 1000);

        let mut expected = values.clone();
        expected.sort();
        assert_eq!(sorted, expected);
        assert_eq!(report.strategy, SortStrategy::InMemory);
        assert_eq!(report.merge_passes, 0);
    }

    #[test]
    fn test_external_sort_small_budget() {
        for &count in &[17usize, 31, 32, 33, 100, 1000, 4999] {
            let values = random_values(count, count as u64);
            let (sorted, report) = sort_with_budget(&values, 16);

            let mut expected = values.clone();
            expected.sort();
            assert_eq!(sorted, expected, "count {}", count);
            assert!(matches!(
                report.strategy,
                SortStrategy::ExternalMerge { .. }
            ));
            assert!(report.merge_passes >= 1);
        }
    }

    #[test]
    fn test_external_sort_wide_fan_in() {
        // Budget of 8192 elements gives a fan-in of 7 with 1024-element windows
        let values = random_values(100_000, 42);
        let (sorted, report) = sort_with_budget(&values, 8192);

        let mut expected = values.clone();
        expected.sort();
        assert_eq!(sorted, expected);
        assert_eq!(report.strategy, SortStrategy::ExternalMerge { runs: 13 });
        assert_eq!(report.merge_passes, 2);
    }

    #[test]
    fn test_negative_values_and_duplicates() {
        let mut values = vec![5, -3, 5, 0, i32::MIN, i32::MAX, -3, 7, 7, 7];
        values.extend(random_values(90, 9).into_iter().map(|v| v - 500_000));

        let (sorted, _) = sort_with_budget(&values, 16);
        let mut expected = values.clone();
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_swap_exhausted() {
        let values = random_values(1000, 3);
        let mut store = store_with(&values);

        let result = BoundedSorter::new(&mut store, 16, SWAP_OFFSET, 1024)
            .sort(FILE_OFFSET, values.len() as u64);
        assert!(matches!(
            result,
            Err(VdiskError::SwapExhausted {
                needed: 4000,
                available: 1024
            })
        ));

        // File untouched
        assert_eq!(
            read_ints(&mut store, FILE_OFFSET, values.len() as u64).unwrap(),
            values
        );
    }

    #[test]
    fn test_sort_does_not_touch_neighbors() {
        let values = random_values(300, 5);
        let mut store = store_with(&values);
        let after = FILE_OFFSET + 300 * 4;
        store.write(after, &[0xAA; 64]).unwrap();
        store.write(FILE_OFFSET - 64, &[0xBB; 64]).unwrap();

        BoundedSorter::new(&mut store, 16, SWAP_OFFSET, SWAP_CAPACITY)
            .sort(FILE_OFFSET, 300)
            .unwrap();

        assert_eq!(store.read(after, 64).unwrap(), vec![0xAA; 64]);
        assert_eq!(store.read(FILE_OFFSET - 64, 64).unwrap(), vec![0xBB; 64]);
    }
}
