/// Mark the enclosed work as `#[cold]`. Every diagnostic path goes through
/// here, since hitting one means the process is about to die.
#[cold]
#[inline(never)]
pub fn cold<R, F: FnOnce() -> R>(f: F) -> R {
    f()
}
