use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bookings_created_total: IntCounter,
    pub booking_updates_total: IntCounterVec,
    pub booking_rejections_total: IntCounterVec,
    pub settlements_total: IntCounter,
    pub route_fallbacks_total: IntCounter,
    pub drivers_available: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_created_total =
            IntCounter::new("bookings_created_total", "Total bookings created")
                .expect("valid bookings_created_total metric");

        let booking_updates_total = IntCounterVec::new(
            Opts::new("booking_updates_total", "Committed booking updates by resulting status"),
            &["status"],
        )
        .expect("valid booking_updates_total metric");

        let booking_rejections_total = IntCounterVec::new(
            Opts::new(
                "booking_rejections_total",
                "Rejected booking operations by error kind",
            ),
            &["kind"],
        )
        .expect("valid booking_rejections_total metric");

        let settlements_total = IntCounter::new("settlements_total", "Total bookings settled")
            .expect("valid settlements_total metric");

        let route_fallbacks_total = IntCounter::new(
            "route_fallbacks_total",
            "Distance lookups answered by the straight-line estimate",
        )
        .expect("valid route_fallbacks_total metric");

        let drivers_available = IntGauge::new(
            "drivers_available",
            "Verified drivers currently available",
        )
        .expect("valid drivers_available metric");

        registry
            .register(Box::new(bookings_created_total.clone()))
            .expect("register bookings_created_total");
        registry
            .register(Box::new(booking_updates_total.clone()))
            .expect("register booking_updates_total");
        registry
            .register(Box::new(booking_rejections_total.clone()))
            .expect("register booking_rejections_total");
        registry
            .register(Box::new(settlements_total.clone()))
            .expect("register settlements_total");
        registry
            .register(Box::new(route_fallbacks_total.clone()))
            .expect("register route_fallbacks_total");
        registry
            .register(Box::new(drivers_available.clone()))
            .expect("register drivers_available");

        Self {
            registry,
            bookings_created_total,
            booking_updates_total,
            booking_rejections_total,
            settlements_total,
            route_fallbacks_total,
            drivers_available,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
