#![no_main]

use bidcos_engine::protocol::registry::MessageRegistry;
use bidcos_engine::queue::{PendingQueues, QueueFormat};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let registry = MessageRegistry::new();

    if let Ok(decoded) = QueueFormat::CURRENT.decode(text, &registry) {
        // Whatever decodes must encode again
        let _ = QueueFormat::CURRENT.encode(decoded.queue_type, decoded.entries.iter());
    }
    let _ = PendingQueues::deserialize(text, &registry);
});
