pub mod injector;
pub mod ledger;

pub use injector::{KeyEvent, KeystrokeInjector, KEY_BACKSPACE, KEY_EQUAL, KEY_LEFTCTRL, KEY_MINUS};
pub use ledger::TypedLedger;
