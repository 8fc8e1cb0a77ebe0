// Compile-time constants shared across the storage and concurrency core.

/// Size in bytes of a single disk page. Every persisted structure (data page,
/// hash bucket page, hash directory page) occupies exactly one page.
pub const BUSTUB_PAGE_SIZE: usize = 4096;

/// Sentinel page id meaning "no page".
pub const INVALID_PAGE_ID: PageId = std::u32::MAX;

/// Sentinel LSN meaning "never written" / no WAL hook has stamped this page.
pub const INVALID_LSN: Lsn = -1;

/// Sentinel transaction id used by the lock manager's `upgrading` slot when
/// no upgrade is in flight.
pub const INVALID_TXN_ID: TransactionId = std::u32::MAX;

/// Default buffer pool size for table-heap-backed collaborators in tests.
pub const TABLE_HEAP_BUFFER_POOL_SIZE: usize = 100;

/// Number of directory bits the extendible hash table's directory page can
/// ever grow to. Bounds both the bucket-page-id and local-depth arrays so the
/// directory page layout is a fixed compile-time size.
pub const HASH_TABLE_DIRECTORY_MAX_DEPTH: u32 = 9;

pub type FrameId = u32;
pub type PageId = u32;
pub type TransactionId = u32;
/// Log sequence number. Bustub uses a signed 32-bit integer so "unset" can be
/// represented as -1 without stealing a value from the valid range.
pub type Lsn = i32;
