//! Catalog maintenance for barbers (with their work gallery and social
//! links), services, courses, products and carousel images. Replacing or
//! deleting an image releases the remote copy afterwards; the database write
//! never depends on the image host answering.

use chrono::{NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    assets::{release_image, ImageHost},
    auth::new_id,
    error::{not_found, AppError, AppResult},
    models::{Barber, BarberWork, CarouselImage, Course, Product, Service, SocialLink},
};

fn clean_url(url: Option<String>) -> Option<String> {
    url.map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required.")));
    }
    Ok(value.to_string())
}

fn check_price(price_cents: i64) -> AppResult<i64> {
    if price_cents < 0 {
        return Err(AppError::Validation("Price cannot be negative.".into()));
    }
    Ok(price_cents)
}

fn unique_violation(message: &str) -> impl FnOnce(sqlx::Error) -> AppError + '_ {
    move |err| {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return AppError::Validation(message.to_string());
            }
        }
        AppError::Database(err)
    }
}

/// Releases `old` when an update replaced or cleared it.
async fn release_replaced(host: &dyn ImageHost, old: Option<&str>, new: Option<&str>) {
    if old.is_some() && old != new {
        release_image(host, old).await;
    }
}

// Barbers

#[derive(Debug, Deserialize)]
pub struct BarberInput {
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub phone: String,
    pub national_id: String,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct BarberPatch {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    /// An empty string removes the photo.
    pub photo_url: Option<String>,
    pub display_order: Option<i64>,
}

pub async fn list_barbers(pool: &SqlitePool) -> Result<Vec<Barber>, sqlx::Error> {
    sqlx::query_as::<_, Barber>("SELECT * FROM barbers ORDER BY display_order, name")
        .fetch_all(pool)
        .await
}

pub async fn get_barber(pool: &SqlitePool, id: &str) -> AppResult<Barber> {
    sqlx::query_as::<_, Barber>("SELECT * FROM barbers WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(not_found("barber"))
}

pub async fn create_barber(pool: &SqlitePool, input: BarberInput) -> AppResult<Barber> {
    let barber = Barber {
        id: new_id(),
        name: required(&input.name, "Name")?,
        bio: input.bio.trim().to_string(),
        phone: input.phone.trim().to_string(),
        national_id: required(&input.national_id, "National id")?,
        photo_url: clean_url(input.photo_url),
        display_order: input.display_order,
    };

    sqlx::query(
        r#"INSERT INTO barbers (id, name, bio, phone, national_id, photo_url, display_order)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&barber.id)
    .bind(&barber.name)
    .bind(&barber.bio)
    .bind(&barber.phone)
    .bind(&barber.national_id)
    .bind(&barber.photo_url)
    .bind(barber.display_order)
    .execute(pool)
    .await
    .map_err(unique_violation("A barber with that national id already exists."))?;

    log::info!("Barber {} created", barber.name);
    Ok(barber)
}

pub async fn update_barber(
    pool: &SqlitePool,
    host: &dyn ImageHost,
    id: &str,
    patch: BarberPatch,
) -> AppResult<Barber> {
    let current = get_barber(pool, id).await?;
    let updated = Barber {
        id: current.id.clone(),
        name: match patch.name {
            Some(name) => required(&name, "Name")?,
            None => current.name.clone(),
        },
        bio: patch.bio.map_or(current.bio.clone(), |bio| bio.trim().to_string()),
        phone: patch.phone.map_or(current.phone.clone(), |phone| phone.trim().to_string()),
        national_id: match patch.national_id {
            Some(national_id) => required(&national_id, "National id")?,
            None => current.national_id.clone(),
        },
        photo_url: match patch.photo_url {
            Some(url) => clean_url(Some(url)),
            None => current.photo_url.clone(),
        },
        display_order: patch.display_order.unwrap_or(current.display_order),
    };

    sqlx::query(
        r#"UPDATE barbers SET name = ?, bio = ?, phone = ?, national_id = ?, photo_url = ?, display_order = ?
           WHERE id = ?"#,
    )
    .bind(&updated.name)
    .bind(&updated.bio)
    .bind(&updated.phone)
    .bind(&updated.national_id)
    .bind(&updated.photo_url)
    .bind(updated.display_order)
    .bind(&updated.id)
    .execute(pool)
    .await
    .map_err(unique_violation("A barber with that national id already exists."))?;

    release_replaced(host, current.photo_url.as_deref(), updated.photo_url.as_deref()).await;
    Ok(updated)
}

/// Deleting a barber also removes their appointments, work gallery and links.
pub async fn delete_barber(pool: &SqlitePool, host: &dyn ImageHost, id: &str) -> AppResult<()> {
    let barber = get_barber(pool, id).await?;
    let works = list_barber_works(pool, &barber.id).await?;
    sqlx::query("DELETE FROM barbers WHERE id = ?")
        .bind(&barber.id)
        .execute(pool)
        .await?;
    log::info!("Barber {} deleted", barber.name);
    release_image(host, barber.photo_url.as_deref()).await;
    for work in &works {
        release_image(host, Some(work.image_url.as_str())).await;
    }
    Ok(())
}

/// Public profile: the barber with their gallery and social links.
#[derive(Debug, Serialize)]
pub struct BarberProfile {
    #[serde(flatten)]
    pub barber: Barber,
    pub works: Vec<BarberWork>,
    pub social_links: Vec<SocialLink>,
}

pub async fn barber_profile(pool: &SqlitePool, id: &str) -> AppResult<BarberProfile> {
    let barber = get_barber(pool, id).await?;
    let works = list_barber_works(pool, &barber.id).await?;
    let social_links = list_social_links(pool, &barber.id).await?;
    Ok(BarberProfile {
        barber,
        works,
        social_links,
    })
}

// Barber work gallery

#[derive(Debug, Deserialize)]
pub struct WorkInput {
    pub image_url: String,
}

pub async fn list_barber_works(
    pool: &SqlitePool,
    barber_id: &str,
) -> Result<Vec<BarberWork>, sqlx::Error> {
    sqlx::query_as::<_, BarberWork>(
        "SELECT * FROM barber_works WHERE barber_id = ? ORDER BY created_at DESC, id",
    )
    .bind(barber_id)
    .fetch_all(pool)
    .await
}

pub async fn add_barber_work(
    pool: &SqlitePool,
    barber_id: &str,
    input: WorkInput,
) -> AppResult<BarberWork> {
    let barber = get_barber(pool, barber_id).await?;
    let work = BarberWork {
        id: new_id(),
        barber_id: barber.id,
        image_url: required(&input.image_url, "Image URL")?,
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO barber_works (id, barber_id, image_url, created_at) VALUES (?, ?, ?, ?)")
        .bind(&work.id)
        .bind(&work.barber_id)
        .bind(&work.image_url)
        .bind(work.created_at)
        .execute(pool)
        .await?;

    Ok(work)
}

pub async fn delete_barber_work(pool: &SqlitePool, host: &dyn ImageHost, id: &str) -> AppResult<()> {
    let work = sqlx::query_as::<_, BarberWork>("SELECT * FROM barber_works WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(not_found("work"))?;
    sqlx::query("DELETE FROM barber_works WHERE id = ?")
        .bind(&work.id)
        .execute(pool)
        .await?;
    release_image(host, Some(work.image_url.as_str())).await;
    Ok(())
}

// Social links

#[derive(Debug, Deserialize)]
pub struct SocialLinkInput {
    pub url: String,
    #[serde(default)]
    pub name: String,
}

pub async fn list_social_links(
    pool: &SqlitePool,
    barber_id: &str,
) -> Result<Vec<SocialLink>, sqlx::Error> {
    sqlx::query_as::<_, SocialLink>(
        "SELECT * FROM barber_social_links WHERE barber_id = ? ORDER BY display_order, id",
    )
    .bind(barber_id)
    .fetch_all(pool)
    .await
}

/// New links go to the end of the list.
pub async fn add_social_link(
    pool: &SqlitePool,
    barber_id: &str,
    input: SocialLinkInput,
) -> AppResult<SocialLink> {
    let barber = get_barber(pool, barber_id).await?;
    let url = required(&input.url, "URL")?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AppError::Validation("The link must be an http(s) URL.".into()));
    }

    let last = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(display_order) FROM barber_social_links WHERE barber_id = ?",
    )
    .bind(&barber.id)
    .fetch_one(pool)
    .await?;

    let link = SocialLink {
        id: new_id(),
        barber_id: barber.id,
        url,
        name: input.name.trim().to_string(),
        display_order: last.map_or(0, |order| order + 1),
    };

    sqlx::query(
        "INSERT INTO barber_social_links (id, barber_id, url, name, display_order) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&link.id)
    .bind(&link.barber_id)
    .bind(&link.url)
    .bind(&link.name)
    .bind(link.display_order)
    .execute(pool)
    .await?;

    Ok(link)
}

/// Renumbers the barber's links in the given order. Ids of other barbers are ignored.
pub async fn reorder_social_links(
    pool: &SqlitePool,
    barber_id: &str,
    ids: &[String],
) -> AppResult<Vec<SocialLink>> {
    let barber = get_barber(pool, barber_id).await?;
    let mut tx = pool.begin().await?;
    for (position, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE barber_social_links SET display_order = ? WHERE id = ? AND barber_id = ?")
            .bind(position as i64)
            .bind(id)
            .bind(&barber.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(list_social_links(pool, &barber.id).await?)
}

pub async fn delete_social_link(pool: &SqlitePool, barber_id: &str, id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM barber_social_links WHERE id = ? AND barber_id = ?")
        .bind(id)
        .bind(barber_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("social link"));
    }
    Ok(())
}

// Services

#[derive(Debug, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub image_url: Option<String>,
    pub display_order: Option<i64>,
}

pub async fn list_services(pool: &SqlitePool) -> Result<Vec<Service>, sqlx::Error> {
    sqlx::query_as::<_, Service>("SELECT * FROM services ORDER BY display_order, name")
        .fetch_all(pool)
        .await
}

pub async fn get_service(pool: &SqlitePool, id: &str) -> AppResult<Service> {
    sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(not_found("service"))
}

pub async fn create_service(pool: &SqlitePool, input: ServiceInput) -> AppResult<Service> {
    let service = Service {
        id: new_id(),
        name: required(&input.name, "Name")?,
        description: input.description.trim().to_string(),
        price_cents: check_price(input.price_cents)?,
        image_url: clean_url(input.image_url),
        display_order: input.display_order,
    };

    sqlx::query(
        r#"INSERT INTO services (id, name, description, price_cents, image_url, display_order)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&service.id)
    .bind(&service.name)
    .bind(&service.description)
    .bind(service.price_cents)
    .bind(&service.image_url)
    .bind(service.display_order)
    .execute(pool)
    .await?;

    log::info!("Service {} created", service.name);
    Ok(service)
}

/// Price changes never touch the snapshot stored on existing bookings.
pub async fn update_service(
    pool: &SqlitePool,
    host: &dyn ImageHost,
    id: &str,
    patch: ServicePatch,
) -> AppResult<Service> {
    let current = get_service(pool, id).await?;
    let updated = Service {
        id: current.id.clone(),
        name: match patch.name {
            Some(name) => required(&name, "Name")?,
            None => current.name.clone(),
        },
        description: patch
            .description
            .map_or(current.description.clone(), |text| text.trim().to_string()),
        price_cents: match patch.price_cents {
            Some(price) => check_price(price)?,
            None => current.price_cents,
        },
        image_url: match patch.image_url {
            Some(url) => clean_url(Some(url)),
            None => current.image_url.clone(),
        },
        display_order: patch.display_order.unwrap_or(current.display_order),
    };

    sqlx::query(
        r#"UPDATE services SET name = ?, description = ?, price_cents = ?, image_url = ?, display_order = ?
           WHERE id = ?"#,
    )
    .bind(&updated.name)
    .bind(&updated.description)
    .bind(updated.price_cents)
    .bind(&updated.image_url)
    .bind(updated.display_order)
    .bind(&updated.id)
    .execute(pool)
    .await?;

    release_replaced(host, current.image_url.as_deref(), updated.image_url.as_deref()).await;
    Ok(updated)
}

pub async fn delete_service(pool: &SqlitePool, host: &dyn ImageHost, id: &str) -> AppResult<()> {
    let service = get_service(pool, id).await?;
    sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(&service.id)
        .execute(pool)
        .await?;
    log::info!("Service {} deleted", service.name);
    release_image(host, service.image_url.as_deref()).await;
    Ok(())
}

// Courses

#[derive(Debug, Deserialize)]
pub struct CourseInput {
    pub title: String,
    pub day: String,
    pub time: NaiveTime,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoursePatch {
    pub title: Option<String>,
    pub day: Option<String>,
    pub time: Option<NaiveTime>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

pub async fn list_courses(pool: &SqlitePool) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses ORDER BY title")
        .fetch_all(pool)
        .await
}

pub async fn get_course(pool: &SqlitePool, id: &str) -> AppResult<Course> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(not_found("course"))
}

pub async fn create_course(pool: &SqlitePool, input: CourseInput) -> AppResult<Course> {
    let course = Course {
        id: new_id(),
        title: required(&input.title, "Title")?,
        day: required(&input.day, "Day")?,
        time: input.time,
        description: input.description.trim().to_string(),
        image_url: clean_url(input.image_url),
    };

    sqlx::query(
        r#"INSERT INTO courses (id, title, day, time, description, image_url)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&course.id)
    .bind(&course.title)
    .bind(&course.day)
    .bind(course.time)
    .bind(&course.description)
    .bind(&course.image_url)
    .execute(pool)
    .await?;

    Ok(course)
}

pub async fn update_course(
    pool: &SqlitePool,
    host: &dyn ImageHost,
    id: &str,
    patch: CoursePatch,
) -> AppResult<Course> {
    let current = get_course(pool, id).await?;
    let updated = Course {
        id: current.id.clone(),
        title: match patch.title {
            Some(title) => required(&title, "Title")?,
            None => current.title.clone(),
        },
        day: match patch.day {
            Some(day) => required(&day, "Day")?,
            None => current.day.clone(),
        },
        time: patch.time.unwrap_or(current.time),
        description: patch
            .description
            .map_or(current.description.clone(), |text| text.trim().to_string()),
        image_url: match patch.image_url {
            Some(url) => clean_url(Some(url)),
            None => current.image_url.clone(),
        },
    };

    sqlx::query(
        "UPDATE courses SET title = ?, day = ?, time = ?, description = ?, image_url = ? WHERE id = ?",
    )
    .bind(&updated.title)
    .bind(&updated.day)
    .bind(updated.time)
    .bind(&updated.description)
    .bind(&updated.image_url)
    .bind(&updated.id)
    .execute(pool)
    .await?;

    release_replaced(host, current.image_url.as_deref(), updated.image_url.as_deref()).await;
    Ok(updated)
}

pub async fn delete_course(pool: &SqlitePool, host: &dyn ImageHost, id: &str) -> AppResult<()> {
    let course = get_course(pool, id).await?;
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(&course.id)
        .execute(pool)
        .await?;
    release_image(host, course.image_url.as_deref()).await;
    Ok(())
}

// Products

#[derive(Debug, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub image_url: Option<String>,
    pub display_order: Option<i64>,
}

pub async fn list_products(pool: &SqlitePool) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY display_order, name")
        .fetch_all(pool)
        .await
}

pub async fn get_product(pool: &SqlitePool, id: &str) -> AppResult<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(not_found("product"))
}

pub async fn create_product(pool: &SqlitePool, input: ProductInput) -> AppResult<Product> {
    let product = Product {
        id: new_id(),
        name: required(&input.name, "Name")?,
        price_cents: check_price(input.price_cents)?,
        image_url: clean_url(input.image_url),
        display_order: input.display_order,
    };

    sqlx::query(
        "INSERT INTO products (id, name, price_cents, image_url, display_order) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&product.id)
    .bind(&product.name)
    .bind(product.price_cents)
    .bind(&product.image_url)
    .bind(product.display_order)
    .execute(pool)
    .await?;

    Ok(product)
}

pub async fn update_product(
    pool: &SqlitePool,
    host: &dyn ImageHost,
    id: &str,
    patch: ProductPatch,
) -> AppResult<Product> {
    let current = get_product(pool, id).await?;
    let updated = Product {
        id: current.id.clone(),
        name: match patch.name {
            Some(name) => required(&name, "Name")?,
            None => current.name.clone(),
        },
        price_cents: match patch.price_cents {
            Some(price) => check_price(price)?,
            None => current.price_cents,
        },
        image_url: match patch.image_url {
            Some(url) => clean_url(Some(url)),
            None => current.image_url.clone(),
        },
        display_order: patch.display_order.unwrap_or(current.display_order),
    };

    sqlx::query(
        "UPDATE products SET name = ?, price_cents = ?, image_url = ?, display_order = ? WHERE id = ?",
    )
    .bind(&updated.name)
    .bind(updated.price_cents)
    .bind(&updated.image_url)
    .bind(updated.display_order)
    .bind(&updated.id)
    .execute(pool)
    .await?;

    release_replaced(host, current.image_url.as_deref(), updated.image_url.as_deref()).await;
    Ok(updated)
}

pub async fn delete_product(pool: &SqlitePool, host: &dyn ImageHost, id: &str) -> AppResult<()> {
    let product = get_product(pool, id).await?;
    sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(&product.id)
        .execute(pool)
        .await?;
    release_image(host, product.image_url.as_deref()).await;
    Ok(())
}

// Carousel

#[derive(Debug, Deserialize)]
pub struct CarouselInput {
    pub image_url: String,
    #[serde(default)]
    pub display_order: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CarouselPatch {
    pub image_url: Option<String>,
    pub display_order: Option<i64>,
}

pub async fn list_carousel(pool: &SqlitePool) -> Result<Vec<CarouselImage>, sqlx::Error> {
    sqlx::query_as::<_, CarouselImage>("SELECT * FROM carousel_images ORDER BY display_order, id")
        .fetch_all(pool)
        .await
}

pub async fn get_carousel_image(pool: &SqlitePool, id: &str) -> AppResult<CarouselImage> {
    sqlx::query_as::<_, CarouselImage>("SELECT * FROM carousel_images WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(not_found("carousel image"))
}

pub async fn create_carousel_image(
    pool: &SqlitePool,
    input: CarouselInput,
) -> AppResult<CarouselImage> {
    let image = CarouselImage {
        id: new_id(),
        image_url: required(&input.image_url, "Image URL")?,
        display_order: input.display_order,
    };

    sqlx::query("INSERT INTO carousel_images (id, image_url, display_order) VALUES (?, ?, ?)")
        .bind(&image.id)
        .bind(&image.image_url)
        .bind(image.display_order)
        .execute(pool)
        .await?;

    Ok(image)
}

pub async fn update_carousel_image(
    pool: &SqlitePool,
    host: &dyn ImageHost,
    id: &str,
    patch: CarouselPatch,
) -> AppResult<CarouselImage> {
    let current = get_carousel_image(pool, id).await?;
    let updated = CarouselImage {
        id: current.id.clone(),
        image_url: match patch.image_url {
            Some(url) => required(&url, "Image URL")?,
            None => current.image_url.clone(),
        },
        display_order: patch.display_order.unwrap_or(current.display_order),
    };

    sqlx::query("UPDATE carousel_images SET image_url = ?, display_order = ? WHERE id = ?")
        .bind(&updated.image_url)
        .bind(updated.display_order)
        .bind(&updated.id)
        .execute(pool)
        .await?;

    release_replaced(host, Some(current.image_url.as_str()), Some(updated.image_url.as_str())).await;
    Ok(updated)
}

pub async fn delete_carousel_image(
    pool: &SqlitePool,
    host: &dyn ImageHost,
    id: &str,
) -> AppResult<()> {
    let image = get_carousel_image(pool, id).await?;
    sqlx::query("DELETE FROM carousel_images WHERE id = ?")
        .bind(&image.id)
        .execute(pool)
        .await?;
    release_image(host, Some(image.image_url.as_str())).await;
    Ok(())
}
