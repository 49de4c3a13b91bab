//! Table diagnostics: chain length distribution and load.

use crate::dict::table::Dict;
use crate::dict::types::DictType;
use std::fmt;

/// Number of histogram slots. The last one counts every chain of that
/// length or longer.
pub const STATS_VECTLEN: usize = 50;

/// A snapshot of how entries are spread over a table's buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct DictStats {
    /// Number of buckets
    pub size: usize,
    /// Number of entries
    pub used: usize,
    /// Number of non-empty buckets
    pub slots: usize,
    /// Longest chain
    pub max_chain_len: usize,
    /// Sum of chain lengths over non-empty buckets
    pub total_chain_len: usize,
    /// `chain_lengths[n]` = number of buckets holding `n` entries
    pub chain_lengths: [usize; STATS_VECTLEN],
}

impl DictStats {
    /// Average chain length measured by walking the chains.
    pub fn avg_chain_len_counted(&self) -> f64 {
        self.total_chain_len as f64 / self.slots as f64
    }

    /// Average chain length derived from the entry count.
    pub fn avg_chain_len_computed(&self) -> f64 {
        self.used as f64 / self.slots as f64
    }
}

impl fmt::Display for DictStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Hash table stats:")?;
        writeln!(f, " table size: {}", self.size)?;
        writeln!(f, " number of elements: {}", self.used)?;
        writeln!(f, " different slots: {}", self.slots)?;
        writeln!(f, " max chain length: {}", self.max_chain_len)?;
        writeln!(
            f,
            " avg chain length (counted): {:.2}",
            self.avg_chain_len_counted()
        )?;
        writeln!(
            f,
            " avg chain length (computed): {:.2}",
            self.avg_chain_len_computed()
        )?;
        write!(f, " Chain length distribution:")?;

        for (len, &count) in self.chain_lengths.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let prefix = if len == STATS_VECTLEN - 1 { ">= " } else { "" };
            write!(
                f,
                "\n   {}{}: {} ({:.2}%)",
                prefix,
                len,
                count,
                count as f64 / self.size as f64 * 100.0
            )?;
        }
        Ok(())
    }
}

impl<T: DictType> Dict<T> {
    /// Walks every bucket and summarises the chain lengths.
    ///
    /// Returns `None` for a table without entries.
    pub fn stats(&self) -> Option<DictStats> {
        if self.is_empty() {
            return None;
        }

        let mut stats = DictStats {
            size: self.size(),
            used: self.len(),
            slots: 0,
            max_chain_len: 0,
            total_chain_len: 0,
            chain_lengths: [0; STATS_VECTLEN],
        };

        for head in &self.table {
            let mut chain_len = 0;
            let mut cursor = *head;
            while let Some(k) = cursor {
                chain_len += 1;
                cursor = self.entries[k].next;
            }

            stats.chain_lengths[chain_len.min(STATS_VECTLEN - 1)] += 1;
            if chain_len == 0 {
                continue;
            }
            stats.slots += 1;
            stats.max_chain_len = stats.max_chain_len.max(chain_len);
            stats.total_chain_len += chain_len;
        }

        Some(stats)
    }
}
