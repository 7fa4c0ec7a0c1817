mod form;
pub mod order;

use actix_web::{dev::HttpServiceFactory, web};

pub fn service() -> impl HttpServiceFactory + 'static {
    web::scope("/api").service(order::order)
}
