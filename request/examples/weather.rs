use fibre_host::HostContext;
use fibre_request::{
  CancellationFlag, Freshness, LoadError, Request, RequestListener, RequestManager, RequestService, RequestStatus,
  RetryPolicy,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// --- Request ---
struct Forecast {
  city: String,
  cancellation: CancellationFlag,
}

impl Request for Forecast {
  type Output = String;

  fn load_from_network(&self) -> Result<String, LoadError> {
    // Pretend to talk to a slow remote service.
    thread::sleep(Duration::from_millis(200));
    Ok(format!("{}: 21°C, light wind", self.city))
  }

  fn cancellation(&self) -> &CancellationFlag {
    &self.cancellation
  }

  fn retry_policy(&self) -> Option<RetryPolicy> {
    Some(RetryPolicy::new(2, Duration::from_millis(100), 2.0))
  }
}

// --- Listener ---
struct PrintingListener(&'static str);

impl RequestListener<String> for PrintingListener {
  fn on_success(&self, value: Arc<String>) {
    println!("[{}] success on {:?}: {}", self.0, thread::current().name(), value);
  }

  fn on_failure(&self, error: LoadError) {
    println!("[{}] failure: {}", self.0, error);
  }

  fn on_progress(&self, status: RequestStatus) {
    println!("[{}] {}", self.0, status);
  }
}

fn main() {
  tracing_subscriber::fmt().with_env_filter("fibre_request=debug").init();

  // --- Setup ---
  let context = HostContext::new("weather-app");
  let service = RequestService::builder("weather")
    .worker_threads(2)
    .build()
    .expect("valid service configuration")
    .bind(&context);

  let manager = RequestManager::new("weather");
  manager.start(&context).expect("service is bound");

  // --- First load goes to the network ---
  let paris = Arc::new(Forecast {
    city: "Paris".to_string(),
    cancellation: CancellationFlag::new(),
  });
  manager
    .execute(paris.clone(), "paris", Freshness::ONE_MINUTE, Some(Arc::new(PrintingListener("first"))))
    .unwrap();
  thread::sleep(Duration::from_millis(500));

  // --- Second load is served from the cache ---
  let again = Arc::new(Forecast {
    city: "Paris".to_string(),
    cancellation: CancellationFlag::new(),
  });
  manager
    .execute(again, "paris", Freshness::ONE_MINUTE, Some(Arc::new(PrintingListener("cached"))))
    .unwrap();

  // --- A cancelled request never reports ---
  let lyon = Arc::new(Forecast {
    city: "Lyon".to_string(),
    cancellation: CancellationFlag::new(),
  });
  manager
    .execute(lyon.clone(), "lyon", Freshness::AlwaysExpired, Some(Arc::new(PrintingListener("cancelled"))))
    .unwrap();
  manager.cancel(&lyon);

  print!("{}", manager.dump_state());
  let drained = manager.stop_and_join(Duration::from_secs(1));
  println!("stopped, drained = {}", drained);
  service.shutdown();
}
