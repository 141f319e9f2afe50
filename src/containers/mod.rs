//! Pool-aware container surface: ordered map/set, forward list, and
//! type-erased callables.

mod forward_list;
mod function;
mod map;
mod set;

pub use forward_list::{CursorMut, ForwardList};
pub use function::{Callback, PoolFunction, INLINE_CALLABLE_SIZE};
pub use map::OrderedMap;
pub use set::OrderedSet;
