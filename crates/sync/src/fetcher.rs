//! Lead Fetcher: a lazy walk over the CRM's paginated lead listing for one day.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, error, warn};

use callsync_core::dates::DayWindow;
use callsync_core::domain::lead::RawLead;

use crate::crm::{CrmClient, CrmError, LeadPage};

#[derive(Clone)]
pub struct LeadFetcher {
    client: Arc<dyn CrmClient>,
    page_size: u32,
}

enum Cursor {
    Next(u32),
    Done,
}

impl LeadFetcher {
    pub fn new(client: Arc<dyn CrmClient>, page_size: u32) -> Self {
        Self { client, page_size: page_size.max(1) }
    }

    /// Pages of leads, starting at page 1. Each call starts a fresh walk.
    ///
    /// The stream ends after a page without a next link, an empty page or an
    /// unexpected envelope. A failed request is yielded once as `Err` and
    /// then the stream ends.
    pub fn pages(&self, window: DayWindow) -> BoxStream<'static, Result<Vec<RawLead>, CrmError>> {
        let client = Arc::clone(&self.client);
        let page_size = self.page_size;

        stream::unfold(Cursor::Next(1), move |cursor| {
            let client = Arc::clone(&client);
            async move {
                let Cursor::Next(page) = cursor else {
                    return None;
                };

                match client.list_leads(&window, page, page_size).await {
                    Ok(LeadPage::Leads { leads, has_next }) => {
                        debug!(day = %window.day, page, count = leads.len(), "fetched lead page");
                        let next = if has_next { Cursor::Next(page + 1) } else { Cursor::Done };
                        Some((Ok(leads), next))
                    }
                    Ok(LeadPage::Empty) => None,
                    Ok(LeadPage::UnexpectedEnvelope) => {
                        warn!(day = %window.day, page, "lead page without expected envelope, stopping");
                        None
                    }
                    Err(failure) => {
                        error!(day = %window.day, page, error = %failure, "lead page request failed");
                        Some((Err(failure), Cursor::Done))
                    }
                }
            }
        })
        .boxed()
    }

    pub fn leads(&self, window: DayWindow) -> BoxStream<'static, Result<RawLead, CrmError>> {
        self.pages(window)
            .map_ok(|leads| stream::iter(leads.into_iter().map(Ok::<RawLead, CrmError>)))
            .try_flatten()
            .boxed()
    }

    /// Collects the whole day. Any page failure fails the day.
    pub async fn fetch_all(&self, window: DayWindow) -> Result<Vec<RawLead>, CrmError> {
        self.leads(window).try_collect().await
    }
}
