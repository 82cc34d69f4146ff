//! Ports - 抽象化レイヤー
//!
//! 外部システム（順序付きストア、時刻、ID 生成）へのインターフェースです。
//! コアはこれらの trait だけに依存し、実装は `impls` に置きます。

pub mod clock;
pub mod id_generator;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock, from_score, to_score};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::store::{OrderedStore, StoreError};
