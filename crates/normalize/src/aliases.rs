//! Recognized key aliases for each fixed field
//!
//! Order matters: the first alias holding a usable value wins.

/// Fixed fields of a normalized record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedField {
    OccurredAt,
    Severity,
    FreeText,
    App,
    Environment,
    CorrelationId,
    JobCorrelationId,
    Duration,
    StatusCode,
    RouteController,
    RouteAction,
    RoutePath,
    HttpMethod,
}

impl FixedField {
    /// All fixed fields
    pub const ALL: [FixedField; 13] = [
        Self::OccurredAt,
        Self::Severity,
        Self::FreeText,
        Self::App,
        Self::Environment,
        Self::CorrelationId,
        Self::JobCorrelationId,
        Self::Duration,
        Self::StatusCode,
        Self::RouteController,
        Self::RouteAction,
        Self::RoutePath,
        Self::HttpMethod,
    ];

    /// Payload keys recognized for this field, in priority order
    ///
    /// The canonical column name is always among them.
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::OccurredAt => &[
                "timestamp",
                "@timestamp",
                "occurred_at",
                "time",
                "ts",
                "datetime",
                "date",
            ],
            Self::Severity => &["level", "severity", "log_level", "loglevel", "lvl"],
            Self::FreeText => &["message", "msg", "free_text", "text", "log"],
            Self::App => &["app", "application", "service", "app_name"],
            Self::Environment => &["environment", "env"],
            Self::CorrelationId => &["correlation_id", "request_id", "requestId", "trace_id"],
            Self::JobCorrelationId => &["job_correlation_id", "job_id", "jid"],
            Self::Duration => &["duration", "duration_ms", "elapsed", "elapsed_ms"],
            Self::StatusCode => &["status_code", "status", "http_status"],
            Self::RouteController => &["route_controller", "controller"],
            Self::RouteAction => &["route_action", "action"],
            Self::RoutePath => &["route_path", "path", "request_path", "url"],
            Self::HttpMethod => &["http_method", "method", "verb"],
        }
    }

    /// Canonical column name
    pub const fn column(self) -> &'static str {
        match self {
            Self::OccurredAt => "occurred_at",
            Self::Severity => "severity",
            Self::FreeText => "free_text",
            Self::App => "app",
            Self::Environment => "environment",
            Self::CorrelationId => "correlation_id",
            Self::JobCorrelationId => "job_correlation_id",
            Self::Duration => "duration",
            Self::StatusCode => "status_code",
            Self::RouteController => "route_controller",
            Self::RouteAction => "route_action",
            Self::RoutePath => "route_path",
            Self::HttpMethod => "http_method",
        }
    }
}

/// Whether a payload key is claimed by any fixed field
pub fn is_fixed_alias(key: &str) -> bool {
    FixedField::ALL
        .iter()
        .any(|field| field.aliases().contains(&key))
}
