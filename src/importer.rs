// Import orchestration.
//
// One sequential pass: load the CSV, build the category tree, create the
// menu, fetch the product listing once, then create every category and
// subcategory in file order and attach the products whose PLUs resolve.
//
// Setup failures abort the run. Anything that goes wrong inside the
// category loop becomes an outcome value, is folded into `ImportResult`
// and the loop moves on to the next sibling. No call is ever retried.
//
// Progress is reported through the `on_event` callback rather than being
// printed, so the caller decides how (or whether) to show it.

use crate::api::CatalogApi;
use crate::config::Settings;
use crate::csv_loader::{load_path, LoadOptions};
use crate::error::{ImportAborted, ImportError, Result};
use crate::products::{PageFetched, ProductIndex};
use crate::structure::{build_structure, Structure, Subcategories};
use std::path::Path;

/// Counts and error messages accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub categories_created: usize,
    pub subcategories_created: usize,
    pub products_added: usize,
    /// PLUs that matched no product and were left out.
    pub plus_not_found: usize,
    pub errors: Vec<String>,
}

impl ImportResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn record(&mut self, outcome: &CategoryOutcome) {
        match outcome {
            CategoryOutcome::Created { subcategories, .. } => {
                self.categories_created += 1;
                for sub in subcategories {
                    self.record_subcategory(sub);
                }
            }
            CategoryOutcome::Failed { .. } => {}
        }
        if let Some(message) = outcome.error_message() {
            self.errors.push(message);
        }
    }

    fn record_subcategory(&mut self, outcome: &SubcategoryOutcome) {
        match outcome {
            SubcategoryOutcome::Attached {
                products, missing, ..
            } => {
                self.subcategories_created += 1;
                self.products_added += products;
                self.plus_not_found += missing;
            }
            SubcategoryOutcome::NoProducts { plus, .. } => {
                self.subcategories_created += 1;
                self.plus_not_found += plus;
            }
            SubcategoryOutcome::EtagFailed { .. } | SubcategoryOutcome::PatchFailed { .. } => {
                self.subcategories_created += 1;
            }
            SubcategoryOutcome::CreateFailed { .. } => {}
        }
        if let Some(message) = outcome.error_message() {
            self.errors.push(message);
        }
    }
}

/// What happened to one Category 2 group.
#[derive(Debug)]
pub enum SubcategoryOutcome {
    Attached {
        name: String,
        products: usize,
        missing: usize,
    },
    /// Created, but none of its PLUs matched a product.
    NoProducts { name: String, plus: usize },
    CreateFailed { name: String, error: ImportError },
    /// Created, but products could not be attached without an etag.
    EtagFailed { name: String, error: ImportError },
    PatchFailed { name: String, error: ImportError },
}

impl SubcategoryOutcome {
    pub fn error_message(&self) -> Option<String> {
        match self {
            SubcategoryOutcome::CreateFailed { name, error }
            | SubcategoryOutcome::PatchFailed { name, error } => {
                Some(format!("Error in subcategory '{}': {}", name, error))
            }
            SubcategoryOutcome::EtagFailed { name, error } => Some(format!(
                "Failed to get etag for subcategory '{}': {}",
                name, error
            )),
            SubcategoryOutcome::Attached { .. } | SubcategoryOutcome::NoProducts { .. } => None,
        }
    }
}

/// What happened to one Category 1 group.
#[derive(Debug)]
pub enum CategoryOutcome {
    Created {
        name: String,
        subcategories: Vec<SubcategoryOutcome>,
    },
    /// Creation failed; its subcategories were not attempted.
    Failed { name: String, error: ImportError },
}

impl CategoryOutcome {
    /// Only the category's own failure; subcategory errors are reported
    /// by their outcomes.
    pub fn error_message(&self) -> Option<String> {
        match self {
            CategoryOutcome::Failed { name, error } => {
                Some(format!("Error in category '{}': {}", name, error))
            }
            CategoryOutcome::Created { .. } => None,
        }
    }
}

/// Progress notifications emitted while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    ReadingCsv,
    RowsLoaded { rows: usize },
    StructureBuilt {
        categories: usize,
        subcategories: usize,
        plus: usize,
        duplicates_removed: usize,
    },
    CreatingCatalog { name: String },
    CatalogCreated { name: String, id: String },
    FetchingProducts,
    ProductPage(PageFetched),
    /// `plu_collisions` counts products ignored because an earlier one
    /// already had the same PLU.
    ProductsLoaded { count: usize, plu_collisions: usize },
    CategoryStarted { index: usize, total: usize, name: String },
    CategoryCreated { name: String },
    /// A category could not be created, so its subcategories were not tried.
    SubcategoriesSkipped { category: String, count: usize },
    SubcategoryStarted { index: usize, total: usize, name: String },
    SubcategoryCreated { name: String },
    EtagFetched { subcategory: String },
    PlusResolved { subcategory: String, found: usize, total: usize },
    ProductsAttached { subcategory: String, count: usize },
    NoProductsFound { subcategory: String, plus: usize },
    ItemFailed { message: String },
    Finished,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub page_size: u32,
    pub load: LoadOptions,
    pub dedupe_plus: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            page_size: crate::config::DEFAULT_PAGE_SIZE,
            load: LoadOptions::default(),
            dedupe_plus: false,
        }
    }
}

impl From<&Settings> for ImportOptions {
    fn from(settings: &Settings) -> Self {
        ImportOptions {
            page_size: settings.page_size,
            load: LoadOptions {
                skip_incomplete_rows: settings.skip_incomplete_rows,
            },
            dedupe_plus: settings.dedupe_plus,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'a> {
    pub account_id: &'a str,
    pub catalog_name: &'a str,
    pub csv_path: &'a Path,
}

/// Result of the pre-import account check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountAccess {
    Granted { name: String },
    /// The account is not linked to the developer account.
    Denied,
}

/// Look up the account name, turning a 403 into `AccountAccess::Denied`.
/// Other failures are returned as errors.
pub fn check_account_access<A: CatalogApi + ?Sized>(api: &A, account_id: &str) -> Result<AccountAccess> {
    match api.get_account_name(account_id) {
        Ok(name) => Ok(AccountAccess::Granted { name }),
        Err(e) if e.is_access_denied() => {
            tracing::warn!(account_id, "account is not linked to the developer account");
            Ok(AccountAccess::Denied)
        }
        Err(e) => Err(e),
    }
}

/// Everything the category loop needs, produced by the setup stage.
struct Prepared {
    structure: Structure,
    catalog_id: String,
    index: ProductIndex,
}

pub struct Importer<'a, A: CatalogApi + ?Sized> {
    api: &'a A,
    options: ImportOptions,
}

impl<'a, A: CatalogApi + ?Sized> Importer<'a, A> {
    pub fn new(api: &'a A, options: ImportOptions) -> Self {
        Importer { api, options }
    }

    pub fn run(
        &self,
        request: &ImportRequest<'_>,
        on_event: &mut dyn FnMut(ImportEvent),
    ) -> std::result::Result<ImportResult, ImportAborted> {
        let mut result = ImportResult::default();
        tracing::info!(
            account_id = request.account_id,
            catalog = request.catalog_name,
            "starting catalog import"
        );

        let prepared = match self.prepare(request, on_event) {
            Ok(prepared) => prepared,
            Err(source) => {
                tracing::error!(error = %source, "import aborted during setup");
                return Err(ImportAborted {
                    source,
                    partial: result,
                });
            }
        };

        let total = prepared.structure.len();
        for (i, (name, subcategories)) in prepared.structure.iter().enumerate() {
            on_event(ImportEvent::CategoryStarted {
                index: i + 1,
                total,
                name: name.to_string(),
            });
            let outcome = self.import_category(request.account_id, &prepared, name, subcategories, on_event);
            if let Some(message) = outcome.error_message() {
                tracing::warn!("{}", message);
                on_event(ImportEvent::ItemFailed { message });
            }
            if let CategoryOutcome::Failed { .. } = outcome {
                on_event(ImportEvent::SubcategoriesSkipped {
                    category: name.to_string(),
                    count: subcategories.len(),
                });
            }
            result.record(&outcome);
        }

        tracing::info!(
            categories = result.categories_created,
            subcategories = result.subcategories_created,
            products = result.products_added,
            errors = result.errors.len(),
            "catalog import finished"
        );
        on_event(ImportEvent::Finished);
        Ok(result)
    }

    fn prepare(&self, request: &ImportRequest<'_>, on_event: &mut dyn FnMut(ImportEvent)) -> Result<Prepared> {
        on_event(ImportEvent::ReadingCsv);
        let rows = load_path(request.csv_path, self.options.load)?;
        on_event(ImportEvent::RowsLoaded { rows: rows.len() });

        let mut structure = build_structure(&rows);
        let duplicates_removed = if self.options.dedupe_plus {
            structure.dedupe_plus()
        } else {
            0
        };
        on_event(ImportEvent::StructureBuilt {
            categories: structure.len(),
            subcategories: structure.subcategory_count(),
            plus: structure.plu_count(),
            duplicates_removed,
        });

        on_event(ImportEvent::CreatingCatalog {
            name: request.catalog_name.to_string(),
        });
        let catalog_id = self.api.create_catalog(request.account_id, request.catalog_name)?;
        tracing::info!(%catalog_id, "catalog created");
        on_event(ImportEvent::CatalogCreated {
            name: request.catalog_name.to_string(),
            id: catalog_id.clone(),
        });

        on_event(ImportEvent::FetchingProducts);
        let products = self.api.get_all_products(
            request.account_id,
            self.options.page_size,
            &mut |page: &PageFetched| on_event(ImportEvent::ProductPage(page.clone())),
        )?;
        let index = ProductIndex::new(&products);
        on_event(ImportEvent::ProductsLoaded {
            count: products.len(),
            plu_collisions: index.collisions(),
        });

        Ok(Prepared {
            structure,
            catalog_id,
            index,
        })
    }

    fn import_category(
        &self,
        account_id: &str,
        prepared: &Prepared,
        name: &str,
        subcategories: &Subcategories,
        on_event: &mut dyn FnMut(ImportEvent),
    ) -> CategoryOutcome {
        let category_id = match self.api.create_category(account_id, &prepared.catalog_id, name) {
            Ok(id) => id,
            Err(error) => {
                return CategoryOutcome::Failed {
                    name: name.to_string(),
                    error,
                }
            }
        };
        tracing::debug!(category = name, %category_id, "category created");
        on_event(ImportEvent::CategoryCreated {
            name: name.to_string(),
        });

        let total = subcategories.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, (sub_name, plus)) in subcategories.iter().enumerate() {
            on_event(ImportEvent::SubcategoryStarted {
                index: i + 1,
                total,
                name: sub_name.clone(),
            });
            let outcome = self.import_subcategory(account_id, prepared, &category_id, sub_name, plus, on_event);
            if let Some(message) = outcome.error_message() {
                tracing::warn!("{}", message);
                on_event(ImportEvent::ItemFailed { message });
            }
            outcomes.push(outcome);
        }

        CategoryOutcome::Created {
            name: name.to_string(),
            subcategories: outcomes,
        }
    }

    fn import_subcategory(
        &self,
        account_id: &str,
        prepared: &Prepared,
        category_id: &str,
        name: &str,
        plus: &[String],
        on_event: &mut dyn FnMut(ImportEvent),
    ) -> SubcategoryOutcome {
        let name = name.to_string();
        let subcategory_id = match self
            .api
            .create_subcategory(account_id, &prepared.catalog_id, category_id, &name)
        {
            Ok(id) => id,
            Err(error) => return SubcategoryOutcome::CreateFailed { name, error },
        };
        on_event(ImportEvent::SubcategoryCreated { name: name.clone() });

        let etag = match self.api.get_etag(&subcategory_id) {
            Ok(etag) => etag,
            Err(error) => return SubcategoryOutcome::EtagFailed { name, error },
        };
        on_event(ImportEvent::EtagFetched {
            subcategory: name.clone(),
        });

        let (product_ids, missing) = prepared.index.resolve(plus);
        on_event(ImportEvent::PlusResolved {
            subcategory: name.clone(),
            found: product_ids.len(),
            total: plus.len(),
        });
        if product_ids.is_empty() {
            on_event(ImportEvent::NoProductsFound {
                subcategory: name.clone(),
                plus: plus.len(),
            });
            return SubcategoryOutcome::NoProducts {
                name,
                plus: plus.len(),
            };
        }

        if let Err(error) = self.api.patch_subcategory(&subcategory_id, &product_ids, &etag) {
            return SubcategoryOutcome::PatchFailed { name, error };
        }
        on_event(ImportEvent::ProductsAttached {
            subcategory: name.clone(),
            count: product_ids.len(),
        });
        SubcategoryOutcome::Attached {
            name,
            products: product_ids.len(),
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_category_contributes_only_its_error() {
        let mut result = ImportResult::default();
        result.record(&CategoryOutcome::Failed {
            name: "Food".into(),
            error: ImportError::Transport("create category failed with status 500: boom".into()),
        });
        assert_eq!(result.categories_created, 0);
        assert_eq!(
            result.errors,
            vec!["Error in category 'Food': create category failed with status 500: boom"]
        );
    }

    #[test]
    fn subcategory_outcomes_fold_into_counts() {
        let mut result = ImportResult::default();
        result.record(&CategoryOutcome::Created {
            name: "Food".into(),
            subcategories: vec![
                SubcategoryOutcome::Attached {
                    name: "Drinks".into(),
                    products: 2,
                    missing: 1,
                },
                SubcategoryOutcome::NoProducts {
                    name: "Snacks".into(),
                    plus: 3,
                },
                SubcategoryOutcome::EtagFailed {
                    name: "Sides".into(),
                    error: ImportError::Transport("etag lookup failed with status 404: ".into()),
                },
                SubcategoryOutcome::CreateFailed {
                    name: "Desserts".into(),
                    error: ImportError::Transport("create subcategory failed with status 500: ".into()),
                },
                SubcategoryOutcome::PatchFailed {
                    name: "Soups".into(),
                    error: ImportError::Conflict {
                        resource_id: "sub-9".into(),
                    },
                },
            ],
        });
        assert_eq!(result.categories_created, 1);
        assert_eq!(result.subcategories_created, 4);
        assert_eq!(result.products_added, 2);
        assert_eq!(result.plus_not_found, 4);
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors[0].starts_with("Failed to get etag for subcategory 'Sides'"));
        assert!(result.errors[1].starts_with("Error in subcategory 'Desserts'"));
        assert!(result.errors[2].contains("stale etag"));
    }
}
