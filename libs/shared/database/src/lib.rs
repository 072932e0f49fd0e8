pub mod supabase;
pub mod lock;

pub use lock::{LockError, SchedulingLock};
pub use supabase::{return_representation, SupabaseClient, SupabaseError};
