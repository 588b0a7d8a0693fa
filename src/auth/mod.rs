//! Edge authentication for page routes.
//!
//! Every page navigation passes through [`auth_gate`], which checks the
//! `token` cookie locally (presence and expiry) and then with the backend's
//! `/user` endpoint before letting the request through.

mod cookie;
mod gate;
mod paths;

pub use cookie::{expired_session_cookie, get_cookie, session_cookie};
pub use gate::{GateOutcome, GateState, NO_STORE, auth_gate};
pub use paths::{
    DEFAULT_DESTINATION, KNOWN_PAGES, MATCHER_EXCLUSIONS, PUBLIC_PREFIXES, SIGNIN_PATH,
    is_known_page, is_matcher_excluded, is_public, is_signin, resolve_destination,
};
