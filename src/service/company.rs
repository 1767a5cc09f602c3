use crate::database::record_store::{RecordStore, collections, fetch_record, list_records, put_record};
use crate::error::app_error::AppError;
use crate::models::company::{CompanyProfile, CompanyRequest};
use tracing::info;
use validator::Validate;

const MAX_SEARCH_RESULTS: usize = 20;

/// Lookup and registration of companies, used before a session exists.
pub struct CompanyDirectory<'a> {
    records: &'a dyn RecordStore,
}

impl<'a> CompanyDirectory<'a> {
    pub fn new(records: &'a dyn RecordStore) -> Self {
        CompanyDirectory { records }
    }

    /// Active companies whose name contains `query`, sorted by name. A blank
    /// query matches nothing.
    pub async fn search(&self, query: &str) -> Result<Vec<CompanyProfile>, AppError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let companies: Vec<CompanyProfile> = list_records(self.records, collections::COMPANIES).await?;
        let mut matches: Vec<CompanyProfile> = companies.into_iter().filter(|c| c.is_active && c.matches_search(query)).collect();
        matches.sort_by_key(|c| c.name.to_lowercase());
        matches.truncate(MAX_SEARCH_RESULTS);
        Ok(matches)
    }

    pub async fn get(&self, id: &str) -> Result<CompanyProfile, AppError> {
        Ok(fetch_record(self.records, collections::COMPANIES, id).await?)
    }

    pub async fn register(&self, request: &CompanyRequest) -> Result<CompanyProfile, AppError> {
        request.validate()?;
        let company = CompanyProfile::from(request);
        put_record(self.records, collections::COMPANIES, &company.id, &company).await?;
        info!(company_id = %company.id, name = %company.name, "company registered");
        Ok(company)
    }
}
