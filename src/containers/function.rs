//! Pool-aware type-erased callables.
//!
//! [`PoolFunction`] owns a callable: up to 16 bytes are stored inline,
//! larger callables are boxed in the pool with the inline slot holding
//! only the pointer. Behaviour is driven by a per-type vtable of
//! invoke/clone/drop function pointers. [`Callback`] is the non-owning
//! counterpart for scoped passing: a borrowed data pointer plus an invoke
//! shim; the callee must outlive it.
//!
//! Both are generic over an argument *tuple*: a `PoolFunction<(i32, i32),
//! i32>` is called as `f.call((a, b))`.

use std::marker::PhantomData;
use std::mem::{align_of, size_of, MaybeUninit};
use std::ptr::NonNull;

use crate::pool::{AllocFlag, Pool, TaggedPool};

/// Callables at most this large (and at most 8-aligned) are stored inline.
pub const INLINE_CALLABLE_SIZE: usize = 16;

struct VTable<Args, R> {
    invoke: unsafe fn(*const (), Args) -> R,
    /// Clones the callable from `src` into `dst` (inline) or returns a
    /// fresh pool box.
    clone: unsafe fn(src: *const (), dst: *mut u8, pool: &Pool, boxed: bool) -> *mut u8,
    /// Drops the callable in place; the caller releases pool storage.
    drop: unsafe fn(*mut ()),
    size: usize,
}

#[repr(align(8))]
struct FnStorage([MaybeUninit<u8>; INLINE_CALLABLE_SIZE]);

/// Per-callable-type vtable instance; `&TABLE` promotes to `'static`.
#[allow(dead_code)]
struct VTableFor<F, Args, R>(PhantomData<(F, fn(Args) -> R)>);

impl<F, Args, R> VTableFor<F, Args, R>
where
    F: Fn(Args) -> R + Clone + 'static,
{
    const TABLE: VTable<Args, R> = VTable {
        invoke: Self::invoke,
        clone: Self::clone_into,
        drop: Self::drop_in_place,
        size: size_of::<F>(),
    };

    unsafe fn invoke(data: *const (), args: Args) -> R {
        (*(data as *const F))(args)
    }

    unsafe fn clone_into(src: *const (), dst: *mut u8, pool: &Pool, boxed: bool) -> *mut u8 {
        let original = &*(src as *const F);
        if boxed {
            let fresh = pool.palloc(size_of::<F>()).as_ptr() as *mut F;
            fresh.write(original.clone());
            fresh as *mut u8
        } else {
            (dst as *mut F).write(original.clone());
            std::ptr::null_mut()
        }
    }

    unsafe fn drop_in_place(data: *mut ()) {
        std::ptr::drop_in_place(data as *mut F)
    }
}

/// A pool-aware owned callable, generic over an argument tuple.
///
/// # Examples
///
/// ```rust
/// use poolcore::{Pool, PoolFlags, PoolFunction};
///
/// let pool = Pool::create(PoolFlags::CUSTOM);
/// {
///     let offset = 10;
///     let add = PoolFunction::new(&pool, move |(a, b): (i32, i32)| a + b + offset);
///     assert_eq!(add.call((1, 2)), 13);
/// }
/// pool.destroy();
/// ```
pub struct PoolFunction<Args: 'static, R: 'static> {
    /// `AllocFlag::FIRST` set = callable is boxed in the pool.
    alloc: TaggedPool,
    storage: FnStorage,
    vtable: &'static VTable<Args, R>,
    _marker: PhantomData<fn(Args) -> R>,
}

impl<Args: 'static, R: 'static> PoolFunction<Args, R> {
    /// Wraps a callable, storing it inline when it fits.
    pub fn new<F>(pool: &Pool, callable: F) -> Self
    where
        F: Fn(Args) -> R + Clone + 'static,
    {
        let mut alloc = TaggedPool::new(pool);
        let mut storage = FnStorage([MaybeUninit::uninit(); INLINE_CALLABLE_SIZE]);
        if Self::inline_eligible::<F>() {
            unsafe {
                (storage.0.as_mut_ptr() as *mut F).write(callable);
            }
        } else {
            let boxed = pool.palloc(size_of::<F>()).as_ptr() as *mut F;
            unsafe {
                boxed.write(callable);
                (storage.0.as_mut_ptr() as *mut *mut F).write(boxed);
            }
            alloc.set(AllocFlag::First);
        }
        PoolFunction {
            alloc,
            storage,
            vtable: Self::vtable::<F>(),
            _marker: PhantomData,
        }
    }

    const fn inline_eligible<F>() -> bool {
        size_of::<F>() <= INLINE_CALLABLE_SIZE && align_of::<F>() <= 8
    }

    fn vtable<F>() -> &'static VTable<Args, R>
    where
        F: Fn(Args) -> R + Clone + 'static,
    {
        &VTableFor::<F, Args, R>::TABLE
    }

    #[inline]
    fn is_boxed(&self) -> bool {
        self.alloc.test(AllocFlag::First)
    }

    #[inline]
    fn data_ptr(&self) -> *const () {
        if self.is_boxed() {
            unsafe { (self.storage.0.as_ptr() as *const *const ()).read() }
        } else {
            self.storage.0.as_ptr() as *const ()
        }
    }

    /// Invokes the callable.
    #[inline]
    pub fn call(&self, args: Args) -> R {
        unsafe { (self.vtable.invoke)(self.data_ptr(), args) }
    }

    /// The pool backing boxed storage.
    pub fn pool(&self) -> Pool {
        self.alloc.pool()
    }

    /// A non-owning view of this callable.
    pub fn as_callback(&self) -> Callback<'_, Args, R> {
        Callback {
            data: self.data_ptr(),
            extra: std::ptr::null(),
            invoke: CallbackInvoke::Plain(self.vtable.invoke),
            _marker: PhantomData,
        }
    }
}

impl<Args: 'static, R: 'static> Clone for PoolFunction<Args, R> {
    fn clone(&self) -> Self {
        let mut alloc = self.alloc.clone();
        alloc.reset(AllocFlag::First);
        let mut storage = FnStorage([MaybeUninit::uninit(); INLINE_CALLABLE_SIZE]);
        let pool = self.alloc.pool();
        let boxed = self.is_boxed();
        let fresh = unsafe {
            (self.vtable.clone)(
                self.data_ptr(),
                storage.0.as_mut_ptr() as *mut u8,
                &pool,
                boxed,
            )
        };
        if boxed {
            unsafe { (storage.0.as_mut_ptr() as *mut *mut u8).write(fresh) };
            alloc.set(AllocFlag::First);
        }
        PoolFunction {
            alloc,
            storage,
            vtable: self.vtable,
            _marker: PhantomData,
        }
    }
}

impl<Args: 'static, R: 'static> Drop for PoolFunction<Args, R> {
    fn drop(&mut self) {
        unsafe {
            let data = self.data_ptr() as *mut ();
            (self.vtable.drop)(data);
            if self.is_boxed() {
                self.alloc
                    .pool()
                    .free(NonNull::new_unchecked(data as *mut u8), self.vtable.size);
            }
        }
    }
}

enum CallbackInvoke<Args, R> {
    Plain(unsafe fn(*const (), Args) -> R),
    WithExtra(unsafe fn(*const (), *const (), Args) -> R),
}

impl<Args, R> Clone for CallbackInvoke<Args, R> {
    fn clone(&self) -> Self {
        match self {
            CallbackInvoke::Plain(f) => CallbackInvoke::Plain(*f),
            CallbackInvoke::WithExtra(f) => CallbackInvoke::WithExtra(*f),
        }
    }
}

/// A non-owning, non-copyable view of a callable.
///
/// Suitable for scoped passing down a call chain; the referenced callable
/// must outlive the view. Supports closures, free functions, and
/// receiver-plus-method pairs.
///
/// # Examples
///
/// ```rust
/// use poolcore::Callback;
///
/// fn run_twice(cb: &Callback<'_, (i32,), i32>) -> i32 {
///     cb.call((1,)) + cb.call((2,))
/// }
///
/// let base = 100;
/// let add = move |(v,): (i32,)| base + v;
/// let cb = Callback::new(&add);
/// assert_eq!(run_twice(&cb), 203);
/// ```
pub struct Callback<'a, Args, R> {
    data: *const (),
    extra: *const (),
    invoke: CallbackInvoke<Args, R>,
    _marker: PhantomData<&'a ()>,
}

impl<'a, Args, R> Callback<'a, Args, R> {
    /// Borrows a callable.
    pub fn new<F>(callable: &'a F) -> Self
    where
        F: Fn(Args) -> R,
    {
        Callback {
            data: callable as *const F as *const (),
            extra: std::ptr::null(),
            invoke: CallbackInvoke::Plain(|data, args| unsafe { (*(data as *const F))(args) }),
            _marker: PhantomData,
        }
    }

    /// Binds a receiver and a method, the pointer-to-member form.
    pub fn bind<T>(receiver: &'a T, method: fn(&T, Args) -> R) -> Self {
        Callback {
            data: receiver as *const T as *const (),
            extra: method as *const (),
            invoke: CallbackInvoke::WithExtra(|data, extra, args| unsafe {
                let method: fn(&T, Args) -> R = std::mem::transmute(extra);
                method(&*(data as *const T), args)
            }),
            _marker: PhantomData,
        }
    }

    /// Invokes the callable.
    #[inline]
    pub fn call(&self, args: Args) -> R {
        unsafe {
            match self.invoke {
                CallbackInvoke::Plain(f) => f(self.data, args),
                CallbackInvoke::WithExtra(f) => f(self.data, self.extra, args),
            }
        }
    }
}
