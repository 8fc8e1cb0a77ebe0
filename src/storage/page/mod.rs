#[allow(clippy::module_inception)]
pub mod page;
pub mod page_guard;

pub mod hash_table_bucket_page;
pub mod hash_table_directory_page;

pub use page::Page;
pub use page_guard::{
    fetch_page_basic, fetch_page_read, fetch_page_write, new_page_guarded, BasicPageGuard,
    ReadPageGuard, WritePageGuard,
};
