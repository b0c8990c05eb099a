mod common;

use common::*;
use fibre_request::{Freshness, LifecycleError, RequestManager};
use std::time::{Duration, SystemTime};

#[test]
fn test_cache_ops_require_started_manager() {
  init_tracing();
  let manager = RequestManager::new(SERVICE);

  assert_eq!(
    manager.get_from_cache::<String>(CACHE_KEY).unwrap_err(),
    LifecycleError::NotStarted
  );
  assert_eq!(
    manager.put_in_cache(CACHE_KEY, String::from("coucou")).unwrap_err(),
    LifecycleError::NotStarted
  );
  assert_eq!(
    manager.remove_all_data_from_cache().unwrap_err(),
    LifecycleError::NotStarted
  );

  let (context, service) = context_with_service();
  manager.start(&context).unwrap();
  assert!(manager.stop_and_join(JOIN_TIMEOUT));

  assert_eq!(
    manager
      .is_data_in_cache::<String>(CACHE_KEY, DURATION)
      .unwrap_err(),
    LifecycleError::Stopped
  );
  assert_eq!(
    manager.remove_data_from_cache::<String>(CACHE_KEY).unwrap_err(),
    LifecycleError::Stopped
  );
  service.shutdown();
}

#[test]
fn test_put_then_read_back() {
  let (manager, _context, service) = started_manager();
  let before = SystemTime::now();

  let stored = manager.put_in_cache(CACHE_KEY, String::from("coucou")).unwrap();
  assert_eq!(stored.as_str(), "coucou");

  let cached = manager.get_from_cache::<String>(CACHE_KEY).unwrap().unwrap();
  assert_eq!(cached.as_str(), "coucou");
  assert!(manager.is_data_in_cache::<String>(CACHE_KEY, DURATION).unwrap());

  let saved_at = manager.get_date_of_data_in_cache::<String>(CACHE_KEY).unwrap().unwrap();
  assert!(saved_at >= before);

  assert!(manager.get_from_cache::<String>(CACHE_KEY2).unwrap().is_none());
  assert!(manager.get_date_of_data_in_cache::<String>(CACHE_KEY2).unwrap().is_none());
  assert!(manager.stop_and_join(JOIN_TIMEOUT));
  service.shutdown();
}

#[test]
fn test_cache_entries_are_typed() {
  let (manager, _context, service) = started_manager();
  manager.put_in_cache(CACHE_KEY, String::from("text")).unwrap();
  manager.put_in_cache(CACHE_KEY, 42u64).unwrap();

  assert_eq!(
    manager.get_from_cache::<String>(CACHE_KEY).unwrap().as_deref().map(String::as_str),
    Some("text")
  );
  assert_eq!(manager.get_from_cache::<u64>(CACHE_KEY).unwrap().as_deref(), Some(&42));
  assert!(manager.get_from_cache::<i32>(CACHE_KEY).unwrap().is_none());

  assert!(manager.remove_data_from_cache::<u64>(CACHE_KEY).unwrap());
  assert!(manager.get_from_cache::<String>(CACHE_KEY).unwrap().is_some());
  assert!(manager.stop_and_join(JOIN_TIMEOUT));
  service.shutdown();
}

#[test]
fn test_freshness_of_cached_data() {
  let (manager, _context, service) = started_manager();
  manager.put_in_cache(CACHE_KEY, String::from("coucou")).unwrap();
  std::thread::sleep(Duration::from_millis(50));

  assert!(!manager
    .is_data_in_cache::<String>(CACHE_KEY, Duration::from_millis(10))
    .unwrap());
  assert!(manager.is_data_in_cache::<String>(CACHE_KEY, DURATION).unwrap());
  assert!(!manager
    .is_data_in_cache::<String>(CACHE_KEY, Freshness::AlwaysExpired)
    .unwrap());
  assert!(manager
    .get_from_cache_if_fresh::<String>(CACHE_KEY, Freshness::AlwaysReturned)
    .unwrap()
    .is_some());
  assert!(manager.stop_and_join(JOIN_TIMEOUT));
  service.shutdown();
}

#[test]
fn test_remove_data() {
  let (manager, _context, service) = started_manager();
  manager.put_in_cache(CACHE_KEY, String::from("one")).unwrap();
  manager.put_in_cache(CACHE_KEY2, String::from("two")).unwrap();

  assert!(manager.remove_data_from_cache::<String>(CACHE_KEY).unwrap());
  assert!(!manager.remove_data_from_cache::<String>(CACHE_KEY).unwrap());
  assert!(manager.get_from_cache::<String>(CACHE_KEY2).unwrap().is_some());

  manager.remove_all_data_from_cache().unwrap();
  assert!(manager.get_from_cache::<String>(CACHE_KEY2).unwrap().is_none());
  assert!(manager.stop_and_join(JOIN_TIMEOUT));
  service.shutdown();
}

#[test]
fn test_put_in_cache_serves_later_request() {
  let (manager, _context, service) = started_manager();
  manager.put_in_cache(CACHE_KEY, String::from("primed")).unwrap();

  let stub = ContentRequestStub::succeeding("from network").shared();
  let listener = RequestListenerStub::new();
  manager
    .execute(stub.clone(), CACHE_KEY, DURATION, listener.as_listener())
    .unwrap();

  assert!(listener.await_outcome(TIMEOUT));
  assert_eq!(listener.value().as_deref(), Some("primed"));
  assert!(!stub.is_load_data_from_network_called());
  assert!(manager.stop_and_join(JOIN_TIMEOUT));
  service.shutdown();
}

#[test]
fn test_managers_on_one_service_share_the_cache() {
  init_tracing();
  let (context, service) = context_with_service();
  let writer = RequestManager::new(SERVICE);
  let reader = RequestManager::new(SERVICE);
  writer.start(&context).unwrap();
  reader.start(&context).unwrap();

  writer.put_in_cache(CACHE_KEY, String::from("shared")).unwrap();
  let cached = reader.get_from_cache::<String>(CACHE_KEY).unwrap().unwrap();
  assert_eq!(cached.as_str(), "shared");

  // Stopping one manager leaves the other usable.
  assert!(writer.stop_and_join(JOIN_TIMEOUT));
  assert!(reader.is_data_in_cache::<String>(CACHE_KEY, DURATION).unwrap());
  assert!(reader.stop_and_join(JOIN_TIMEOUT));
  service.shutdown();
}
