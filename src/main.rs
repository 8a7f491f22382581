#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    let rocket = importer_server::rocket();
    log::info!("Starting importer API server");
    rocket
}
