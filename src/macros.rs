// Logging shims: forward to `log` when the `log` feature is on, otherwise
// type-check the arguments and compile to nothing.

#[cfg(feature = "log")]
macro_rules! trace {
    ($($t:tt)*) => { log::trace!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! trace {
    ($($t:tt)*) => {
        if false {
            let _ = format_args!($($t)*);
        }
    };
}

#[cfg(feature = "log")]
macro_rules! debug {
    ($($t:tt)*) => { log::debug!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! debug {
    ($($t:tt)*) => {
        if false {
            let _ = format_args!($($t)*);
        }
    };
}

#[cfg(feature = "log")]
macro_rules! warn {
    ($($t:tt)*) => { log::warn!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! warn {
    ($($t:tt)*) => {
        if false {
            let _ = format_args!($($t)*);
        }
    };
}
