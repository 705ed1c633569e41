//! Chunk ranges: split a byte stream into consecutive frames of bounded size.

/// Default frame size in bytes.
pub const DEFAULT_FRAME_SIZE: usize = 16 * 1024; // 16 KiB
/// Largest frame size that still fits one length-prefixed wire frame.
pub const MAX_FRAME_SIZE: usize = crate::wire::MAX_PAYLOAD_LEN;

/// Byte range of one data frame: `start..end` of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

fn effective_size(frame_size: usize) -> u64 {
    if frame_size == 0 {
        DEFAULT_FRAME_SIZE as u64
    } else {
        frame_size as u64
    }
}

/// Ranges of at most `frame_size` (0 = default) covering `total_len` bytes,
/// in source order. The last range may be shorter. Computed lazily, so the
/// source length never decides how much is allocated.
pub fn chunk_ranges(total_len: u64, frame_size: usize) -> ChunkRanges {
    ChunkRanges {
        total_len,
        size: effective_size(frame_size),
        next: ChunkRange {
            index: 0,
            start: 0,
            end: 0,
        },
    }
}

#[derive(Debug, Clone)]
pub struct ChunkRanges {
    total_len: u64,
    size: u64,
    next: ChunkRange,
}

impl Iterator for ChunkRanges {
    type Item = ChunkRange;

    fn next(&mut self) -> Option<ChunkRange> {
        let start = self.next.end;
        if start >= self.total_len {
            return None;
        }
        let range = ChunkRange {
            index: if start == 0 { 0 } else { self.next.index + 1 },
            start,
            end: (start + self.size).min(self.total_len),
        };
        self.next = range;
        Some(range)
    }
}

/// `ceil(total_len / frame_size)`.
pub fn chunk_count(total_len: u64, frame_size: usize) -> usize {
    total_len.div_ceil(effective_size(frame_size)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(total_len: u64, frame_size: usize) -> Vec<ChunkRange> {
        chunk_ranges(total_len, frame_size).collect()
    }

    #[test]
    fn split_chunks() {
        let chunks = split(40, 16);
        let lens: Vec<u64> = chunks.iter().map(ChunkRange::len).collect();
        assert_eq!(lens, vec![16, 16, 8]);
        assert_eq!(chunks[2].start, 32);
        assert_eq!(chunks[2].end, 40);
        assert_eq!(chunks[2].index, 2);
    }

    #[test]
    fn split_exact_multiple() {
        let chunks = split(90, 30);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].end, 90);
    }

    #[test]
    fn split_single_chunk() {
        let chunks = split(10, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 10);
    }

    #[test]
    fn split_zero_length() {
        assert!(split(0, 30).is_empty());
        assert_eq!(chunk_count(0, 30), 0);
    }

    #[test]
    fn split_zero_frame_size_uses_default() {
        let chunks = split(DEFAULT_FRAME_SIZE as u64 * 2 + 1, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 1);
    }

    #[test]
    fn lazy_ranges_cover_huge_lengths() {
        let total = 1u64 << 40;
        let mut ranges = chunk_ranges(total, 1 << 20);
        let first = ranges.next().unwrap();
        assert_eq!((first.index, first.start, first.end), (0, 0, 1 << 20));
        let last = ranges.last().unwrap();
        assert_eq!(last.index, chunk_count(total, 1 << 20) - 1);
        assert_eq!(last.end, total);
    }

    #[test]
    fn ranges_are_contiguous() {
        for (len, size) in [(1u64, 1usize), (1000, 7), (4096, 4096), (4097, 4096)] {
            let chunks = split(len, size);
            assert_eq!(chunks.len(), chunk_count(len, size));
            let mut expected_start = 0;
            for c in &chunks {
                assert_eq!(c.start, expected_start);
                assert!(c.len() as usize <= size && !c.is_empty());
                expected_start = c.end;
            }
            assert_eq!(expected_start, len);
        }
    }
}
