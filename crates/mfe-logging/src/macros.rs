//! ---
//! mfe_section: "03-logging"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Structured logging adapters for micro-app lifecycle events."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
//! Context-aware logging macros.

#[doc(hidden)]
#[macro_export]
macro_rules! __mfe_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx: &$crate::LogContext = &$ctx;
        $crate::__tracing::event!(
            $level,
            app = ctx.app.unwrap_or(""),
            status = ctx.status.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            entry = ctx.entry.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with micro-app context.
#[macro_export]
macro_rules! mfe_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mfe_event!($crate::__tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mfe_event!($crate::__tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with micro-app context.
#[macro_export]
macro_rules! mfe_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mfe_event!($crate::__tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mfe_event!($crate::__tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with micro-app context.
#[macro_export]
macro_rules! mfe_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mfe_event!($crate::__tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mfe_event!($crate::__tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with micro-app context.
#[macro_export]
macro_rules! mfe_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__mfe_event!($crate::__tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__mfe_event!($crate::__tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
