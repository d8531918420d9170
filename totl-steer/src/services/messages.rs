//! Member-facing message copy

/// Text templates branded with the configured product name
#[derive(Debug, Clone)]
pub struct MessageCopy {
    brand: String,
}

impl Default for MessageCopy {
    fn default() -> Self {
        Self::new("Totl")
    }
}

impl MessageCopy {
    pub fn new(brand: impl Into<String>) -> Self {
        Self {
            brand: brand.into(),
        }
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    // ------------------------------------------------------------------
    // Proactive referral messages
    // ------------------------------------------------------------------

    pub fn opt_in_invitation(&self, first_name: &str, sponsor: &str) -> String {
        format!(
            "Hi {}, {} works with {} to help you get certain tests with no out of pocket cost. \
             You have a new referral. Reply YES to see your $0 options.",
            first_name, sponsor, self.brand
        )
    }

    pub fn steerage(&self, first_name: &str, service: &str, facility: &str, zero_cost: bool) -> String {
        if zero_cost {
            format!(
                "Hi {}, your doctor ordered {}. You can get this with no out of pocket cost at {}.",
                first_name, service, facility
            )
        } else {
            format!(
                "Hi {}, your doctor ordered {}. Your lowest-cost option nearby is {}.",
                first_name, service, facility
            )
        }
    }

    pub fn onboarding(&self) -> String {
        format!(
            "Hi, this is {}, working with your employer's health plan. We help you get many labs \
             and imaging tests at $0. When your doctor gives you an order, text us a photo and \
             we'll show you the nearest $0 options. Reply YES to enroll or STOP to opt out.",
            self.brand
        )
    }

    // ------------------------------------------------------------------
    // Inbound replies
    // ------------------------------------------------------------------

    pub fn opt_out_confirmation(&self) -> String {
        format!(
            "{}: You won't get more messages. Reply START if that changes.",
            self.brand
        )
    }

    pub fn enrolled(&self) -> String {
        "Thanks! You're now enrolled. We'll text you when we find $0 options for your referrals."
            .to_string()
    }

    pub fn welcome_back(&self) -> String {
        format!(
            "Welcome back to {}! You are now enrolled. Text us a photo of your order to get started.",
            self.brand
        )
    }

    pub fn unknown_sender_prompt(&self) -> String {
        "Thanks for sending your referral. Before we can process it, we need your OK to help you \
         find $0 lab or imaging locations under your health plan. Reply YES to continue or STOP \
         to opt out."
            .to_string()
    }

    pub fn opted_out_prompt(&self) -> String {
        format!(
            "You have previously opted out of {} messages. Reply START to opt back in and receive \
             help with your lab/imaging orders.",
            self.brand
        )
    }

    pub fn support_ack(&self) -> String {
        format!(
            "{}: Got your message. A support associate will text you back within 24 hours.",
            self.brand
        )
    }

    pub fn media_received_enrolled(&self, first_name: &str) -> String {
        format!(
            "Hi {}, thanks for sending your referral. We're reviewing it now and will send your \
             best option soon.",
            first_name
        )
    }

    pub fn media_received_invite(&self, first_name: &str, plan_name: &str) -> String {
        format!(
            "Hi {}, {} works with {} to help you minimize your out of pocket cost for tests like \
             this. Reply YES to see your best option.",
            first_name, plan_name, self.brand
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_is_applied() {
        let copy = MessageCopy::new("Acme");
        assert!(copy.opt_out_confirmation().starts_with("Acme:"));
        assert!(copy.opt_in_invitation("Ana", "Globex").contains("Globex works with Acme"));
    }

    #[test]
    fn test_steerage_names_facility() {
        let copy = MessageCopy::default();
        let text = copy.steerage("Ana", "MRI of the Knee", "QuickScan Imaging", true);
        assert!(text.contains("QuickScan Imaging"));
        assert!(text.contains("no out of pocket cost"));
        let text = copy.steerage("Ana", "MRI of the Knee", "QuickScan Imaging", false);
        assert!(!text.contains("no out of pocket cost"));
    }
}
