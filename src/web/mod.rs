pub mod handlers;
pub mod routes;
pub mod templates;

#[cfg(test)]
mod tests;

pub use routes::create_router;
