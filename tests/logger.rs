// Installs the global logger, so it has a test binary to itself and does not
// use test-env-log, which installs its own.

use spin::Mutex;

use pi_core::logger::{self, SinkLogger};

static OUTPUT: Mutex<[u8; 256]> = Mutex::new([0; 256]);
static LEN: Mutex<usize> = Mutex::new(0);

fn capture(byte: u8) {
    let mut len = LEN.lock();
    if let Some(slot) = OUTPUT.lock().get_mut(*len) {
        *slot = byte;
        *len += 1;
    }
}

static LOGGER: SinkLogger<fn(u8)> = SinkLogger::new(capture, false);

#[test]
fn test_global_logger() {
    logger::init(&LOGGER, log::LevelFilter::Info).unwrap();
    assert!(logger::init(&LOGGER, log::LevelFilter::Info).is_err());

    log::info!("booted in {} ms", 12);
    log::debug!("filtered out");
    log::error!("no SD card");

    let len = *LEN.lock();
    let output = OUTPUT.lock();
    let text = core::str::from_utf8(&output[..len]).unwrap();
    let lines: Vec<&str> = text.split("\r\n").collect();
    assert_eq!(lines.len(), 3, "{:?}", text);
    assert!(lines[0].starts_with("[info tests/logger.rs:"), "{}", lines[0]);
    assert!(lines[0].ends_with("] booted in 12 ms"), "{}", lines[0]);
    assert!(lines[1].starts_with("[error "), "{}", lines[1]);
    assert!(lines[1].ends_with("] no SD card"), "{}", lines[1]);
    assert_eq!(lines[2], "");
}
