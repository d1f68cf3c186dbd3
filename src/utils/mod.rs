pub mod code_generator;
pub mod countdown;
pub mod hostname;
pub mod jwt;
pub mod password;
pub mod progress;
pub mod ticket_number;
pub mod ticket_ranges;

pub use code_generator::{generate_reference_code, generate_slug};
pub use countdown::{CountdownEvent, ExpiryTracker, ReservationCountdown};
pub use hostname::{normalize_domain, validate_domain};
pub use jwt::*;
pub use password::*;
pub use progress::ProgressTracker;
pub use ticket_number::{NumberingConfig, format_ticket_number};
pub use ticket_ranges::{TicketRange, TicketSet, compress_indices};
