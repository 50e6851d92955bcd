pub mod params;
pub mod profile;
pub mod schedule;
pub mod schema;

pub use params::{ParamDef, Params};
pub use profile::{Profile, Timings};
pub use schedule::WaitSpec;
pub use schema::{
    BrowserConfig, Config, FormSelectors, LoginConfig, OnFailure, ReservationConfig, RunConfig,
    SiteConfig, SubmitMarkers, Viewport,
};
