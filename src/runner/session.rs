//! Login and navigation up to the facility list.

use crate::config::{FormSelectors, LoginConfig, SiteConfig, Timings};
use crate::page::FormPage;
use crate::{Error, Result};
use tracing::{debug, info};

/// Log in and wait until the reservation menu is offered.
pub async fn login<P: FormPage + ?Sized>(
    page: &P,
    login: &LoginConfig,
    site: &SiteConfig,
    timings: &Timings,
) -> Result<()> {
    let sel = &site.selectors;
    info!("opening login page {}", site.login_url);
    page.goto(&site.login_url).await?;
    page.wait_for_selector(&sel.login_facility_code, timings.navigation_timeout_ms)
        .await?;

    page.fill(&sel.login_facility_code, &login.facility_code)
        .await?;
    page.fill(&sel.login_group_code, &login.group_code).await?;
    page.fill(&sel.login_password, &login.password).await?;
    page.click(&sel.login_submit).await?;
    debug!("login submitted for group {}", login.group_code);

    page.wait_for_selector(&sel.reserve_menu, timings.navigation_timeout_ms)
        .await
        .map_err(|e| match e {
            Error::Timeout(msg) => Error::Timeout(format!(
                "menu did not appear after login, check the credentials ({})",
                msg
            )),
            e => e,
        })?;
    info!("logged in");
    Ok(())
}

/// Open the direct reservation menu and wait for the facility list.
pub async fn open_menu<P: FormPage + ?Sized>(
    page: &P,
    sel: &FormSelectors,
    timings: &Timings,
) -> Result<()> {
    page.click(&sel.reserve_menu).await?;
    page.wait_for_url(&sel.facility_list_url, timings.navigation_timeout_ms)
        .await?;
    page.wait_for_text(&sel.facility_list_marker, timings.navigation_timeout_ms)
        .await?;
    info!("facility list open: {}", page.url().await?);
    Ok(())
}
