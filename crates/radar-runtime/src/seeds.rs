//! Built-in DNS seeds, used when the config names no seeds.

use radar_wire::Network;

const MAINNET: &[&str] = &[
    "seed.bitcoin.sipa.be",
    "dnsseed.bluematt.me",
    "seed.bitcoin.jonasschnelli.ch",
    "seed.btc.petertodd.net",
    "seed.bitcoin.sprovoost.nl",
    "dnsseed.emzy.de",
    "seed.bitcoin.wiz.biz",
];

const TESTNET: &[&str] = &[
    "testnet-seed.bitcoin.jonasschnelli.ch",
    "seed.tbtc.petertodd.net",
    "seed.testnet.bitcoin.sprovoost.nl",
    "testnet-seed.bluematt.me",
];

const SIGNET: &[&str] = &["seed.signet.bitcoin.sprovoost.nl"];

pub fn dns_seeds(network: Network) -> &'static [&'static str] {
    match network {
        Network::Mainnet => MAINNET,
        Network::Testnet => TESTNET,
        Network::Signet => SIGNET,
        Network::Regtest => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regtest_has_no_seeds() {
        assert!(dns_seeds(Network::Regtest).is_empty());
        assert!(!dns_seeds(Network::Mainnet).is_empty());
    }
}
