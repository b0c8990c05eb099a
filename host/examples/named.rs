use fibre_host::{HostContext, ResolveError};
use std::sync::Arc;

// --- Abstraction and Implementations ---
trait MessageSender: Send + Sync {
  fn send(&self, to: &str, message: &str) -> String;
}

struct EmailSender;
impl MessageSender for EmailSender {
  fn send(&self, to: &str, message: &str) -> String {
    format!("Sending email to {}: '{}'", to, message)
  }
}

struct SmsSender;
impl MessageSender for SmsSender {
  fn send(&self, to: &str, message: &str) -> String {
    format!("Sending SMS to {}: '{}'", to, message)
  }
}

fn main() {
  let context = HostContext::new("notifications");

  // --- Binding ---
  // Two implementations of one trait, told apart by name.
  context.bind_trait::<dyn MessageSender>(Some("email"), || Arc::new(EmailSender));
  context.bind_trait::<dyn MessageSender>(Some("sms"), || Arc::new(SmsSender));

  // --- Resolution ---
  let email = context.resolve::<dyn MessageSender>(Some("email")).unwrap();
  let sms = context.resolve::<dyn MessageSender>(Some("sms")).unwrap();

  println!("{}", email.send("test@example.com", "Hello from Fibre!"));
  println!("{}", sms.send("+123456789", "Hello from Fibre!"));

  // --- Missing bindings are errors, not panics ---
  match context.resolve::<dyn MessageSender>(Some("pigeon")) {
    Err(ResolveError::NotBound { .. }) => println!("no pigeon sender bound"),
    other => panic!("unexpected resolution: {:?}", other.map(|_| ())),
  }
}
