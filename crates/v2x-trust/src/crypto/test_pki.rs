//! Throwaway certificate authority for unit tests.

use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};

use super::{Certificate, Credentials, Signer};

pub(crate) struct TestPki {
    pub ca: Certificate,
    ca_cert: rcgen::Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "V2X Test CA");
        dn.push(DnType::OrganizationName, "v2x testbed");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = params.self_signed(&ca_key).unwrap();
        let ca = Certificate::from_der(ca_cert.der().to_vec()).unwrap();
        Self { ca, ca_cert, ca_key }
    }

    pub fn ca_pem(&self) -> String {
        self.ca_cert.pem()
    }

    pub fn issue(&self, name: &str) -> Credentials {
        self.issue_with(name, |_| {})
    }

    pub fn issue_expired(&self, name: &str) -> Credentials {
        self.issue_with(name, |params| {
            params.not_before = rcgen::date_time_ymd(2000, 1, 1);
            params.not_after = rcgen::date_time_ymd(2001, 1, 1);
        })
    }

    /// PKCS#8 DER and PEM encodings of a fresh P-256 key.
    pub fn key_material() -> (Vec<u8>, String) {
        let key = KeyPair::generate().unwrap();
        (key.serialize_der(), key.serialize_pem())
    }

    fn issue_with(&self, name: &str, tweak: impl FnOnce(&mut CertificateParams)) -> Credentials {
        let key = KeyPair::generate().unwrap();
        let certificate = self.sign_leaf(name, &key, tweak);
        let signer = Signer::from_pkcs8(&key.serialize_der()).unwrap();
        Credentials::new(certificate, signer)
    }

    fn sign_leaf(
        &self,
        name: &str,
        key: &KeyPair,
        tweak: impl FnOnce(&mut CertificateParams),
    ) -> Certificate {
        let mut params = CertificateParams::new(vec![format!("{}.v2x.test", name.to_lowercase())])
            .unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        tweak(&mut params);
        let cert = params.signed_by(key, &self.ca_cert, &self.ca_key).unwrap();
        Certificate::from_der(cert.der().to_vec()).unwrap()
    }
}
