use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::accounts::normalize_email;
use crate::documents::ProductsDoc;
use crate::error::{MarketError, MarketResult};
use crate::marketplace::SharedClient;
use crate::records::{ContactMethod, Product, ProductStatus};

/// Seller-supplied fields of a new listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub contact: String,
    pub contact_method: ContactMethod,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductDraft {
    /// Check the draft, returning it with surrounding whitespace trimmed.
    pub fn validated(mut self) -> MarketResult<Self> {
        for field in [
            &mut self.title,
            &mut self.description,
            &mut self.category,
            &mut self.condition,
            &mut self.location,
            &mut self.contact,
        ] {
            *field = field.trim().to_string();
        }

        let invalid = |reason: &str| -> MarketResult<Self> {
            Err(MarketError::InvalidProduct(reason.to_string()))
        };
        if self.title.chars().count() < 2 {
            return invalid("title must be at least 2 characters");
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return invalid("price must be a positive number");
        }
        if self.category.is_empty() {
            return invalid("category is required");
        }
        if self.description.chars().count() < 10 {
            return invalid("description must be at least 10 characters");
        }
        if self.contact_method != ContactMethod::Chat && self.contact.is_empty() {
            return invalid("contact details are required for this contact method");
        }
        Ok(self)
    }
}

/// The product feed.
#[derive(Clone)]
pub struct Catalog {
    client: SharedClient,
}

impl Catalog {
    pub(crate) fn new(client: SharedClient) -> Self {
        Self { client }
    }

    /// Publish a listing at the head of the feed.
    pub async fn publish(&self, seller_email: &str, draft: ProductDraft) -> MarketResult<Product> {
        let draft = draft.validated()?;
        let seller_email = normalize_email(seller_email);
        let seller = seller_email
            .split('@')
            .next()
            .unwrap_or(&seller_email)
            .to_string();

        let product = Product {
            id: Uuid::now_v7(),
            title: draft.title,
            description: draft.description,
            price: draft.price,
            category: draft.category,
            condition: draft.condition,
            location: draft.location,
            contact: draft.contact,
            contact_method: draft.contact_method,
            seller,
            seller_email,
            images: draft.images,
            created_at: Utc::now(),
            status: ProductStatus::Available,
            views: 0,
            likes: 0,
        };

        self.client
            .update::<ProductsDoc, _, MarketError, _>(|doc| {
                doc.products.insert(0, product.clone());
                Ok(())
            })
            .await?;
        info!(product_id = %product.id, seller = %product.seller_email, "product published");
        Ok(product)
    }

    /// All listings, newest first.
    pub async fn products(&self) -> MarketResult<Vec<Product>> {
        Ok(self.client.load::<ProductsDoc>().await?.into_inner().products)
    }

    pub async fn get(&self, id: Uuid) -> MarketResult<Product> {
        self.client
            .load::<ProductsDoc>()
            .await?
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(MarketError::ProductNotFound(id))
    }

    /// Case-insensitive match on title, description or category.
    ///
    /// A blank query returns every listing.
    pub async fn search(&self, query: &str) -> MarketResult<Vec<Product>> {
        let needle = query.trim().to_lowercase();
        let products = self.products().await?;
        if needle.is_empty() {
            return Ok(products);
        }
        let hits: Vec<Product> = products
            .into_iter()
            .filter(|p| {
                [&p.title, &p.description, &p.category]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .collect();
        debug!(query = %needle, hits = hits.len(), "product search");
        Ok(hits)
    }

    /// Mark a listing sold. Only its seller may do this.
    pub async fn mark_sold(&self, id: Uuid, seller_email: &str) -> MarketResult<Product> {
        let seller_email = normalize_email(seller_email);
        let product = self
            .modify(id, |p| {
                if p.seller_email != seller_email {
                    return Err(MarketError::NotSeller { id });
                }
                p.status = ProductStatus::Sold;
                Ok(())
            })
            .await?;
        info!(product_id = %id, "product sold");
        Ok(product)
    }

    pub async fn record_view(&self, id: Uuid) -> MarketResult<Product> {
        self.modify(id, |p| {
            p.views += 1;
            Ok(())
        })
        .await
    }

    pub async fn like(&self, id: Uuid) -> MarketResult<Product> {
        self.modify(id, |p| {
            p.likes += 1;
            Ok(())
        })
        .await
    }

    pub async fn unlike(&self, id: Uuid) -> MarketResult<Product> {
        self.modify(id, |p| {
            p.likes = p.likes.saturating_sub(1);
            Ok(())
        })
        .await
    }

    async fn modify<F>(&self, id: Uuid, mut f: F) -> MarketResult<Product>
    where
        F: FnMut(&mut Product) -> MarketResult<()> + Send,
    {
        let product = self
            .client
            .update::<ProductsDoc, _, MarketError, _>(|doc| {
                let product = doc.by_id_mut(id).ok_or(MarketError::ProductNotFound(id))?;
                f(product)?;
                Ok(product.clone())
            })
            .await?;
        Ok(product)
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}
