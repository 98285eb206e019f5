//! Schools and their students. Schools are shared between tournaments and are
//! never deleted while a team or student still refers to them.

use chrono::NaiveDateTime;
use diesel::{SqliteConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    schema::{schools, students, teams},
    store::new_id,
    validation,
};

#[derive(Queryable, Selectable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = schools)]
#[diesel(check_for_backend(Sqlite))]
pub struct School {
    pub id: String,
    pub name: String,
    pub district: String,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

#[derive(AsChangeset, Deserialize, Default, Clone, Debug)]
#[diesel(table_name = schools)]
pub struct SchoolChanges {
    pub name: Option<String>,
    pub district: Option<String>,
}

impl School {
    pub fn fetch(
        school_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<School, Error> {
        schools::table
            .filter(schools::id.eq(school_id))
            .select(School::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("school {school_id}")))
    }

    pub fn list(conn: &mut SqliteConnection) -> Result<Vec<School>, Error> {
        Ok(schools::table
            .order_by(schools::name.asc())
            .select(School::as_select())
            .load(conn)?)
    }

    #[tracing::instrument(skip(conn))]
    pub fn create(
        name: &str,
        district: &str,
        conn: &mut SqliteConnection,
    ) -> Result<School, Error> {
        validation::required("name", name, 200)?;
        validation::max_len("district", district, 200)?;

        let id = new_id();
        diesel::insert_into(schools::table)
            .values((
                schools::id.eq(&id),
                schools::name.eq(name),
                schools::district.eq(district),
            ))
            .execute(conn)?;

        School::fetch(&id, conn)
    }

    pub fn update(
        &self,
        changes: &SchoolChanges,
        conn: &mut SqliteConnection,
    ) -> Result<School, Error> {
        if let Some(name) = &changes.name {
            validation::required("name", name, 200)?;
        }
        if let Some(district) = &changes.district {
            validation::max_len("district", district, 200)?;
        }

        diesel::update(schools::table.filter(schools::id.eq(&self.id)))
            .set((changes, schools::updated.eq(diesel::dsl::now)))
            .execute(conn)?;

        School::fetch(&self.id, conn)
    }

    /// Deletes a school which no team or student refers to.
    #[tracing::instrument(skip(conn))]
    pub fn delete(
        school_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<(), Error> {
        let referenced = diesel::select(diesel::dsl::exists(
            teams::table.filter(teams::school.eq(school_id)),
        ))
        .get_result::<bool>(conn)?
            || diesel::select(diesel::dsl::exists(
                students::table.filter(students::school.eq(school_id)),
            ))
            .get_result::<bool>(conn)?;

        if referenced {
            return Err(Error::ValidationFailed(format!(
                "school {school_id} still has teams or students"
            )));
        }

        match diesel::delete(schools::table.filter(schools::id.eq(school_id)))
            .execute(conn)?
        {
            0 => Err(Error::NotFound(format!("school {school_id}"))),
            _ => Ok(()),
        }
    }
}

#[derive(
    Queryable, Selectable, Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
)]
#[diesel(table_name = students)]
#[diesel(check_for_backend(Sqlite))]
pub struct Student {
    pub id: String,
    pub name: String,
    pub school: String,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

impl Student {
    pub fn fetch(
        student_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Student, Error> {
        students::table
            .filter(students::id.eq(student_id))
            .select(Student::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("student {student_id}")))
    }

    pub fn of_school(
        school_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Student>, Error> {
        Ok(students::table
            .filter(students::school.eq(school_id))
            .order_by(students::name.asc())
            .select(Student::as_select())
            .load(conn)?)
    }

    #[tracing::instrument(skip(conn))]
    pub fn create(
        name: &str,
        school_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Student, Error> {
        validation::required("name", name, 200)?;
        School::fetch(school_id, conn)?;

        let id = new_id();
        diesel::insert_into(students::table)
            .values((
                students::id.eq(&id),
                students::name.eq(name),
                students::school.eq(school_id),
            ))
            .execute(conn)?;

        Student::fetch(&id, conn)
    }

    pub fn delete(
        student_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<(), Error> {
        match diesel::delete(students::table.filter(students::id.eq(student_id)))
            .execute(conn)?
        {
            0 => Err(Error::NotFound(format!("student {student_id}"))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures::test_conn;

    #[test]
    fn referenced_schools_cannot_be_deleted() {
        let mut conn = test_conn();
        let school = School::create("Lincoln High", "North", &mut conn).unwrap();
        let student = Student::create("Ada", &school.id, &mut conn).unwrap();
        assert_eq!(
            Student::of_school(&school.id, &mut conn).unwrap(),
            vec![student.clone()]
        );

        assert!(matches!(
            School::delete(&school.id, &mut conn),
            Err(Error::ValidationFailed(_))
        ));

        Student::delete(&student.id, &mut conn).unwrap();
        School::delete(&school.id, &mut conn).unwrap();
        assert!(matches!(
            School::fetch(&school.id, &mut conn),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn students_need_an_existing_school() {
        let mut conn = test_conn();
        assert!(matches!(
            Student::create("Ada", "no-such-school", &mut conn),
            Err(Error::NotFound(_))
        ));
    }
}
