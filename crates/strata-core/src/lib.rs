mod lru;
mod work_timer;

pub use lru::LruList;
pub use work_timer::WorkTimer;

use ahash::{AHashMap, AHashSet};
pub type SmallKeyHashMap<K, V> = AHashMap<K, V>;
pub type SmallKeyHashSet<K> = AHashSet<K>;
