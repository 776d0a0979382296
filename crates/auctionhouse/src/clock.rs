use chrono::{DateTime, Utc};

/// Source of the current time. All services take this as a dependency so
/// tests can run against a fixed or manually advanced clock.
pub trait Now: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<F> Now for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        (self)()
    }
}

pub fn system_clock() -> std::sync::Arc<dyn Now> {
    std::sync::Arc::new(Utc::now as fn() -> DateTime<Utc>)
}

#[cfg(test)]
pub mod testing {
    use {
        super::*,
        std::sync::Mutex,
    };

    /// Clock that tests can move forward explicitly.
    pub struct FakeClock(Mutex<DateTime<Utc>>);

    impl FakeClock {
        pub fn new(now: DateTime<Utc>) -> Self {
            Self(Mutex::new(now))
        }

        pub fn set(&self, now: DateTime<Utc>) {
            *self.0.lock().unwrap() = now;
        }

        pub fn advance(&self, by: chrono::Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Now for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
