use quiche_wire::crypto::{EncryptionLevel, NullDecrypter, NullEncrypter};
use quiche_wire::framer::Framer;
use quiche_wire::MINI_QUICHE_VERSION;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut framer = Framer::new(MINI_QUICHE_VERSION, false);
    framer.cryptor_mut().set_encrypter(EncryptionLevel::None, Box::new(NullEncrypter));
    framer.cryptor_mut().set_decrypter(Box::new(NullDecrypter));

    tracing::info!(version = MINI_QUICHE_VERSION, "quiche-wire framer ready");
}
