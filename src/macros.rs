//! Call-site capturing shorthands for the `file:line` entry points.

/// `new T`: `new_single!(i32)`
#[macro_export]
macro_rules! new_single {
    ($t:ty) => {
        $crate::new_single::<$t>(file!(), line!())
    };
}

/// `new T[count]`: `new_array!(i32, 16)`
#[macro_export]
macro_rules! new_array {
    ($t:ty, $count:expr) => {
        $crate::new_array::<$t>($count, file!(), line!())
    };
}

/// `delete trunk`
#[macro_export]
macro_rules! delete_single {
    ($trunk:expr) => {
        $crate::delete_single(&$trunk, file!(), line!())
    };
}

/// `delete[] trunk`
#[macro_export]
macro_rules! delete_array {
    ($trunk:expr) => {
        $crate::delete_array(&$trunk, file!(), line!())
    };
}
