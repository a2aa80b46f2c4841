use gbn_abstract::{DataLinkProtocol, LinkDriver};
use tracing::{info, trace};

/// Run `protocol` on `driver` until the driver shuts down.
///
/// Events are handled strictly one at a time in delivery order. The driver's
/// `wait_for_event` is the only place the loop suspends. Returns the number of
/// events handled.
pub fn run<D: LinkDriver>(protocol: &mut dyn DataLinkProtocol, driver: &mut D) -> u64 {
    protocol.init(driver);
    let mut handled = 0;
    while let Some(event) = driver.wait_for_event() {
        trace!(?event, "dispatch");
        protocol.on_event(driver, event);
        handled += 1;
    }
    info!(handled, "event source closed");
    handled
}
