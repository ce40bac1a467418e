mod authorize;
mod callback;
mod stripe;
mod traits;

pub use authorize::{build_authorization_url, SCOPE};
pub use callback::{CallbackHandler, CallbackOutcome, CallbackParams};
pub use stripe::StripeOAuthClient;
pub use traits::{Deauthorized, OAuthTokenRecord, TokenExchange};
