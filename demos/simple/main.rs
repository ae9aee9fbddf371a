use offerkit::{ClientConfig, OfferRequest};

#[tokio::main]
pub async fn main() {
    env_logger::init();

    let client = ClientConfig::from_env()
        .on_failed(|err| eprintln!("OfferKit is not reachable: {err}"))
        .to_client()
        .expect("OFFERKIT_AGENT_ID and OFFERKIT_AGENT_SECRET must be set");

    // Block waiting for the credentials to be verified. Requests can be sent before that, but
    // this tells early whether the agent is set up correctly.
    let status = tokio::task::block_in_place(|| client.wait_for_first_check());
    println!("Connected: {}, agent: {:?}", status.connected, status.agent);

    match client
        .get_offers(&OfferRequest::new("productivity tools", "demo-session"))
        .await
    {
        Ok(response) => {
            for offer in response.offers {
                println!("{} ({}): {}", offer.title, offer.product_name, offer.action_endpoint);
            }
        }
        Err(err) => eprintln!("Failed to get offers: {} [{}]", err.message(), err.code()),
    }

    client.stop_health_check();
}
